//! Provides the [`Config`] structure describing how to reach the console. It is read from a TOML
//! file and can be partially overridden from the command line.

use crate::ftp::{ANONYMOUS_USER, DEFAULT_PORT, DEFAULT_TIMEOUT};
use serde::Deserialize;
use std::time::Duration;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_user() -> String {
    ANONYMOUS_USER.to_owned()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address of the console. Usually given on the command line instead.
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Zero disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            user: default_user(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Parses a configuration from the contents of a TOML file. Missing fields take their
    /// default values.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Returns the network timeout or `None` when it is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs != 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.port, 2121);
        assert_eq!(config.user, "anonymous");
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn reads_all_fields() {
        let config = Config::from_toml(
            "host = \"192.168.1.20\"\nport = 21\nuser = \"ps4\"\npassword = \"x\"\ntimeout_secs = 0\n",
        )
        .unwrap();

        assert_eq!(config.host.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.port, 21);
        assert_eq!(config.user, "ps4");
        assert_eq!(config.password, "x");
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn default_target_matches_default_config() {
        use crate::ftp::RemoteTarget;

        assert_eq!(
            RemoteTarget::with_config("10.0.0.2", &Config::default()),
            RemoteTarget::new("10.0.0.2")
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Config::from_toml("hots = \"1.2.3.4\"").is_err());
    }
}
