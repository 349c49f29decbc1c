//! A minimal FTP client used to reach the console's file system.
//!
//! Every [`Transport`] operation runs in its own short-lived session: connect, log in
//! anonymously, switch to binary mode, perform one operation, quit. Nothing is pooled or reused
//! between operations and nothing is retried.

/// Provides [`TransportError`] that describes failures of FTP sessions.
pub mod error {
    use std::io;
    use thiserror::Error;

    /// An error which may occur while opening or using an FTP session.
    #[derive(Error, Debug)]
    pub enum TransportError {
        /// The connection couldn't be established or broke down during a transfer.
        #[error("connection failed: {0}")]
        Io(#[from] io::Error),
        /// The server refused a command, including the login.
        #[error("server refused the command with {code}: {message}")]
        Rejected { code: u16, message: String },
        /// The server replied with something that isn't a valid FTP reply.
        #[error("malformed server reply: {0}")]
        Protocol(String),
        /// The requested remote path doesn't exist.
        #[error("remote path is unavailable: {0}")]
        NotFound(String),
    }

    impl TransportError {
        /// Returns `true` when the failure means that the remote path doesn't exist.
        pub fn is_not_found(&self) -> bool {
            matches!(self, TransportError::NotFound(_))
        }
    }
}

use crate::config::Config;
pub use error::TransportError;
use std::{
    collections::BTreeSet,
    io::{BufRead, BufReader, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

/// The port the console's FTP payload listens on.
pub const DEFAULT_PORT: u16 = 2121;
pub const ANONYMOUS_USER: &str = "anonymous";
/// Connect, read and write timeout of a session unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory names starting with this marker are never containers.
const RESERVED_MARKER: char = '.';
/// Directory names this short or shorter are never containers.
const MIN_CONTAINER_NAME_LEN: usize = 4;
const ASSET_EXTENSIONS: [&str; 2] = [".png", ".at9"];

const REPLY_NOT_FOUND: u16 = 550;

/// The address and credentials of the console. Not stored anywhere, only passed to every
/// session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Applied to connecting and to every read and write on both connections.
    pub timeout: Option<Duration>,
}

impl RemoteTarget {
    /// Creates a target on the default port with anonymous credentials and the default timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: ANONYMOUS_USER.to_owned(),
            password: String::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Creates a target from a configuration with an already resolved host.
    pub fn with_config(host: impl Into<String>, config: &Config) -> Self {
        Self {
            host: host.into(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            timeout: config.timeout(),
        }
    }
}

/// A reply of the server on the control connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

/// Reads a possibly multi-line reply from the control connection.
fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply, TransportError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(TransportError::Protocol("connection closed".to_owned()));
    }

    let head = line.trim_end();
    let code = head
        .get(..3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Protocol(head.to_owned()))?;
    let mut message = head.get(4..).unwrap_or_default().to_owned();

    // Multi-line replies start with "123-" and end with a line starting with "123 ".
    if head.as_bytes().get(3) == Some(&b'-') {
        let terminator = format!("{} ", code);
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(TransportError::Protocol(
                    "connection closed inside a multi-line reply".to_owned(),
                ));
            }
            let text = line.trim_end();
            if text.starts_with(&terminator) || text == terminator.trim_end() {
                break;
            }
            message.push('\n');
            message.push_str(text);
        }
    }

    trace!("<- {} {}", code, message);

    Ok(Reply { code, message })
}

/// Extracts the data port from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
fn parse_passive_port(message: &str) -> Result<u16, TransportError> {
    let malformed = || TransportError::Protocol(format!("bad passive reply: {}", message));

    let start = message.find('(').ok_or_else(malformed)?;
    let end = message[start..].find(')').ok_or_else(malformed)? + start;
    let fields = message[start + 1..end]
        .split(',')
        .map(|field| field.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;

    match fields[..] {
        [_, _, _, _, hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(malformed()),
    }
}

/// What a line of a `LIST` reply describes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

/// A parsed line of a Unix-style `LIST` reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Parses a line like `drwxr-xr-x 1 root root 512 Jan 01 2020 CUSA00001`.
///
/// Returns `None` for lines that don't describe an entry, like the `total` line.
pub fn parse_list_line(line: &str) -> Option<ListEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let kind = match line.chars().next()? {
        'd' => EntryKind::Directory,
        '-' => EntryKind::File,
        _ => EntryKind::Other,
    };

    // Mode, links, owner, group, size and three date fields come before the name.
    let mut rest = line;
    for _ in 0..8 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        rest = &rest[end..];
    }

    let name = rest.trim_start();
    if name.is_empty() {
        return None;
    }

    Some(ListEntry {
        name: name.to_owned(),
        kind,
    })
}

/// Returns `true` for directory names that can be containers.
pub fn is_container_name(name: &str) -> bool {
    !name.starts_with(RESERVED_MARKER) && name.chars().count() > MIN_CONTAINER_NAME_LEN
}

/// Returns `true` for file names of images and sounds.
pub fn is_asset_file_name(name: &str) -> bool {
    ASSET_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// An open, logged in FTP session.
pub struct FtpSession {
    control: BufReader<TcpStream>,
    peer: SocketAddr,
    timeout: Option<Duration>,
}

impl FtpSession {
    /// Connects to the target, logs in and switches to binary mode.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the connection can't be established or the server
    /// refuses the login.
    pub fn open(target: &RemoteTarget) -> Result<Self, TransportError> {
        debug!("Connecting to {}:{}.", target.host, target.port);

        let stream = connect((target.host.as_str(), target.port), target.timeout)?;
        let peer = stream.peer_addr()?;
        let mut session = Self {
            control: BufReader::new(stream),
            peer,
            timeout: target.timeout,
        };

        let greeting = read_reply(&mut session.control)?;
        expect(greeting, &[220])?;

        let reply = session.command(&format!("USER {}", target.user))?;
        if reply.code == 331 {
            let reply = session.command(&format!("PASS {}", target.password))?;
            expect(reply, &[230, 202])?;
        } else {
            expect(reply, &[230])?;
        }

        let reply = session.command("TYPE I")?;
        expect(reply, &[200])?;

        debug!("Logged in to {} as {}.", peer, target.user);

        Ok(session)
    }

    /// Sends a command and reads its reply.
    pub fn command(&mut self, command: &str) -> Result<Reply, TransportError> {
        if command.starts_with("PASS ") {
            trace!("-> PASS ****");
        } else {
            trace!("-> {}", command);
        }

        let stream = self.control.get_mut();
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;

        read_reply(&mut self.control)
    }

    /// Enters passive mode and connects the data connection.
    ///
    /// The address from the reply is ignored in favour of the control connection's peer since
    /// the console may advertise an address that isn't reachable from here.
    fn open_data(&mut self) -> Result<TcpStream, TransportError> {
        let reply = expect(self.command("PASV")?, &[227])?;
        let port = parse_passive_port(&reply.message)?;

        trace!("Opening data connection to {}:{}.", self.peer.ip(), port);

        connect(SocketAddr::new(self.peer.ip(), port), self.timeout)
    }

    /// Runs a command that transfers data over a fresh data connection.
    fn transfer<T, F>(&mut self, command: &str, op: F) -> Result<T, TransportError>
    where
        F: FnOnce(TcpStream) -> Result<T, TransportError>,
    {
        let data = self.open_data()?;
        expect(self.command(command)?, &[125, 150])?;
        let value = op(data)?;
        expect(read_reply(&mut self.control)?, &[226, 250])?;
        Ok(value)
    }

    /// Lists the entries of a remote directory.
    pub fn list(&mut self, path: &str) -> Result<Vec<ListEntry>, TransportError> {
        let listing = self.transfer(&format!("LIST {}", path), |mut data| {
            let mut listing = Vec::new();
            data.read_to_end(&mut listing)?;
            Ok(listing)
        })?;

        Ok(String::from_utf8_lossy(&listing)
            .lines()
            .filter_map(parse_list_line)
            .filter(|entry| entry.name != "." && entry.name != "..")
            .collect())
    }

    /// Downloads a remote file.
    pub fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let bytes = self.transfer(&format!("RETR {}", path), |mut data| {
            let mut bytes = Vec::new();
            data.read_to_end(&mut bytes)?;
            Ok(bytes)
        })?;

        debug!("Retrieved {} bytes from {}.", bytes.len(), path);

        Ok(bytes)
    }

    /// Uploads a remote file, replacing it if it exists.
    pub fn store(&mut self, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        self.transfer(&format!("STOR {}", path), |mut data| {
            data.write_all(bytes)?;
            data.flush()?;
            data.shutdown(Shutdown::Write)?;
            Ok(())
        })
        .map_err(|e| match e {
            TransportError::NotFound(message) => TransportError::Rejected {
                code: REPLY_NOT_FOUND,
                message,
            },
            e => e,
        })?;

        debug!("Stored {} bytes to {}.", bytes.len(), path);

        Ok(())
    }

    /// Deletes a remote file.
    pub fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        expect(self.command(&format!("DELE {}", path))?, &[250])?;

        debug!("Deleted {}.", path);

        Ok(())
    }

    /// Ends the session. Failures are logged and otherwise ignored.
    pub fn quit(mut self) {
        match self.command("QUIT") {
            Ok(_) => trace!("Session with {} closed.", self.peer),
            Err(e) => trace!("Couldn't close session with {} cleanly: {}", self.peer, e),
        }
    }
}

fn connect<A: ToSocketAddrs>(
    addr: A,
    timeout: Option<Duration>,
) -> Result<TcpStream, TransportError> {
    let stream = match timeout {
        Some(timeout) => {
            let mut last_error = None;
            let mut stream = None;
            for addr in addr.to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(s) => {
                        stream = Some(s);
                        break;
                    }
                    Err(e) => last_error = Some(e),
                }
            }
            match (stream, last_error) {
                (Some(stream), _) => stream,
                (None, Some(e)) => return Err(e.into()),
                (None, None) => {
                    return Err(TransportError::Protocol(
                        "host resolved to no addresses".to_owned(),
                    ))
                }
            }
        }
        None => TcpStream::connect(addr)?,
    };

    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    Ok(stream)
}

/// Turns replies with unexpected codes into errors.
fn expect(reply: Reply, codes: &[u16]) -> Result<Reply, TransportError> {
    if codes.contains(&reply.code) {
        Ok(reply)
    } else if reply.code == REPLY_NOT_FOUND {
        Err(TransportError::NotFound(reply.message))
    } else {
        Err(TransportError::Rejected {
            code: reply.code,
            message: reply.message,
        })
    }
}

/// The operations the console's file system offers. Each call is independent of the others.
pub trait Transport {
    /// Lists the entries of a remote directory.
    fn list(&self, target: &RemoteTarget, path: &str) -> Result<Vec<ListEntry>, TransportError>;

    /// Downloads a remote file.
    fn fetch_bytes(&self, target: &RemoteTarget, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Uploads a remote file, replacing it if it exists.
    fn store_bytes(
        &self,
        target: &RemoteTarget,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Deletes a remote file.
    fn delete_path(&self, target: &RemoteTarget, path: &str) -> Result<(), TransportError>;

    /// Lists the directories under `root` that can be containers, sorted by name.
    fn list_directories(
        &self,
        target: &RemoteTarget,
        root: &str,
    ) -> Result<Vec<String>, TransportError> {
        let mut names: Vec<String> = self
            .list(target, root)?
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Directory && is_container_name(&entry.name))
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Lists the image and sound files directly under `path`.
    fn list_files(
        &self,
        target: &RemoteTarget,
        path: &str,
    ) -> Result<BTreeSet<String>, TransportError> {
        Ok(self
            .list(target, path)?
            .into_iter()
            .filter(|entry| entry.kind != EntryKind::Directory && is_asset_file_name(&entry.name))
            .map(|entry| entry.name)
            .collect())
    }
}

/// A [`Transport`] that opens a new [`FtpSession`] for every operation.
#[derive(Copy, Clone, Debug, Default)]
pub struct FtpTransport;

impl FtpTransport {
    fn with_session<T, F>(&self, target: &RemoteTarget, op: F) -> Result<T, TransportError>
    where
        F: FnOnce(&mut FtpSession) -> Result<T, TransportError>,
    {
        let mut session = FtpSession::open(target)?;
        let result = op(&mut session);
        session.quit();
        result
    }
}

impl Transport for FtpTransport {
    fn list(&self, target: &RemoteTarget, path: &str) -> Result<Vec<ListEntry>, TransportError> {
        self.with_session(target, |session| session.list(path))
    }

    fn fetch_bytes(&self, target: &RemoteTarget, path: &str) -> Result<Vec<u8>, TransportError> {
        self.with_session(target, |session| session.retrieve(path))
    }

    fn store_bytes(
        &self,
        target: &RemoteTarget,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.with_session(target, |session| session.store(path, bytes))
    }

    fn delete_path(&self, target: &RemoteTarget, path: &str) -> Result<(), TransportError> {
        self.with_session(target, |session| session.delete(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_single_line_reply() {
        let mut input = Cursor::new(&b"220 FTP server ready\r\n"[..]);
        let reply = read_reply(&mut input).unwrap();

        assert_eq!(reply.code, 220);
        assert_eq!(reply.message, "FTP server ready");
    }

    #[test]
    fn reads_multi_line_reply() {
        let mut input = Cursor::new(&b"211-Features:\r\n PASV\r\n SIZE\r\n211 End\r\n200 next\r\n"[..]);
        let reply = read_reply(&mut input).unwrap();

        assert_eq!(reply.code, 211);
        assert_eq!(reply.message, "Features:\n PASV\n SIZE");
        assert_eq!(read_reply(&mut input).unwrap().code, 200);
    }

    #[test]
    fn rejects_garbage_reply() {
        let mut input = Cursor::new(&b"hello\r\n"[..]);
        assert!(matches!(
            read_reply(&mut input),
            Err(TransportError::Protocol(_))
        ));

        let mut empty = Cursor::new(&b""[..]);
        assert!(matches!(
            read_reply(&mut empty),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn parses_passive_reply() {
        assert_eq!(
            parse_passive_port("Entering Passive Mode (192,168,1,20,8,74).").unwrap(),
            2122
        );
        assert!(parse_passive_port("Entering Passive Mode").is_err());
        assert!(parse_passive_port("Entering Passive Mode (1,2,3)").is_err());
    }

    #[test]
    fn parses_list_lines() {
        assert_eq!(
            parse_list_line("drwxrwxrwx 1 root wheel 512 Jan 01 2020 CUSA01234\r"),
            Some(ListEntry {
                name: "CUSA01234".to_owned(),
                kind: EntryKind::Directory,
            })
        );
        assert_eq!(
            parse_list_line("-rw-rw-rw-   1 root  wheel  43210 Mar  3 12:00 my icon0.png"),
            Some(ListEntry {
                name: "my icon0.png".to_owned(),
                kind: EntryKind::File,
            })
        );
        assert_eq!(parse_list_line("total 12"), None);
        assert_eq!(parse_list_line(""), None);
    }

    #[test]
    fn container_names() {
        assert!(is_container_name("CUSA01234"));
        assert!(is_container_name("NPXX00001"));
        assert!(!is_container_name(".tmp"));
        assert!(!is_container_name(".hidden_dir"));
        assert!(!is_container_name("AB"));
        assert!(!is_container_name("ABCD"));
    }

    #[test]
    fn asset_file_names() {
        assert!(is_asset_file_name("icon0.png"));
        assert!(is_asset_file_name("snd0.at9"));
        assert!(!is_asset_file_name("param.sfo"));
        assert!(!is_asset_file_name("png"));
    }

    struct Listing(Vec<ListEntry>);

    impl Transport for Listing {
        fn list(&self, _: &RemoteTarget, _: &str) -> Result<Vec<ListEntry>, TransportError> {
            Ok(self.0.clone())
        }

        fn fetch_bytes(&self, _: &RemoteTarget, path: &str) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::NotFound(path.to_owned()))
        }

        fn store_bytes(&self, _: &RemoteTarget, _: &str, _: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn delete_path(&self, _: &RemoteTarget, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn entry(name: &str, kind: EntryKind) -> ListEntry {
        ListEntry {
            name: name.to_owned(),
            kind,
        }
    }

    #[test]
    fn filters_and_sorts_directories() {
        let transport = Listing(vec![
            entry("NPXX00001", EntryKind::Directory),
            entry(".tmp", EntryKind::Directory),
            entry("AB", EntryKind::Directory),
            entry("CUSA01234", EntryKind::Directory),
            entry("CUSA09999.txt", EntryKind::File),
        ]);

        let names = transport
            .list_directories(&RemoteTarget::new("localhost"), "/user/appmeta/")
            .unwrap();

        assert_eq!(names, ["CUSA01234", "NPXX00001"]);
    }

    #[test]
    fn filters_asset_files() {
        let transport = Listing(vec![
            entry("icon0.png", EntryKind::File),
            entry("snd0.at9", EntryKind::File),
            entry("param.sfo", EntryKind::File),
            entry("old.png", EntryKind::Directory),
        ]);

        let names = transport
            .list_files(&RemoteTarget::new("localhost"), "/user/appmeta/CUSA00001/")
            .unwrap();

        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            ["icon0.png", "snd0.at9"]
        );
    }
}
