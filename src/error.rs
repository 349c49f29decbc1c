use crate::{asset::AssetError, ftp::TransportError, sfo::SfoError, sync::SyncError};
use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// File actions that are supported by the [`FileOpError`] type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FileOpAction {
    /// Specifies that an error occurred while trying to create a file.
    Create,
    /// Specifies that an error occurred while opening an existing file.
    Open,
    /// Specifies that an error occurred while reading from a file.
    Read,
    /// Specifies that an error occurred while writing to a file.
    Write,
}

/// An error type that contains enough information to display an error which occurred during a
/// local file I/O operation.
#[derive(Debug)]
pub struct FileOpError {
    /// The action which caused an error.
    pub action: FileOpAction,
    /// The name of the file to be included into the error message.
    pub name: &'static str,
    /// The path to the file on which the I/O operation was performed.
    pub path: PathBuf,
    /// The error returned by the I/O operation.
    pub error: io::Error,
}

impl FileOpError {
    /// Creates a boxed [`FileOpError`].
    pub fn boxed(
        action: FileOpAction,
        name: &'static str,
        path: PathBuf,
        error: io::Error,
    ) -> Box<Self> {
        Box::new(Self {
            action,
            name,
            path,
            error,
        })
    }

    /// Creates a boxed [`FileOpError`] setting action to [`FileOpAction::Create`].
    pub fn make_create(name: &'static str, path: PathBuf, error: io::Error) -> Box<Self> {
        Self::boxed(FileOpAction::Create, name, path, error)
    }

    /// Creates a boxed [`FileOpError`] setting action to [`FileOpAction::Open`].
    pub fn make_open(name: &'static str, path: PathBuf, error: io::Error) -> Box<Self> {
        Self::boxed(FileOpAction::Open, name, path, error)
    }

    /// Creates a boxed [`FileOpError`] setting action to [`FileOpAction::Read`].
    pub fn make_read(name: &'static str, path: PathBuf, error: io::Error) -> Box<Self> {
        Self::boxed(FileOpAction::Read, name, path, error)
    }

    /// Creates a boxed [`FileOpError`] setting action to [`FileOpAction::Write`].
    pub fn make_write(name: &'static str, path: PathBuf, error: io::Error) -> Box<Self> {
        Self::boxed(FileOpAction::Write, name, path, error)
    }

    /// Returns `true` if the file couldn't be created because it already exists.
    pub fn is_exists(&self) -> bool {
        self.action == FileOpAction::Create && self.error.kind() == io::ErrorKind::AlreadyExists
    }
}

impl fmt::Display for FileOpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let verb = match self.action {
            FileOpAction::Create => "create",
            FileOpAction::Open => "open",
            FileOpAction::Read => "read",
            FileOpAction::Write => "write",
        };

        write!(
            f,
            "failed to {} {} at path {}: {}",
            verb,
            self.name,
            self.path.display(),
            self.error
        )
    }
}

impl Error for FileOpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// A type that describes errors which may be returned by the command line front end.
#[derive(Debug, Error)]
pub enum CliError<'a> {
    /// A catch-all for all local file I/O errors.
    #[error("{0}")]
    FileOp(#[from] Box<FileOpError>),
    /// An error that may occur during config file parsing.
    #[error("failed to parse the config file at {}: {}", .0.display(), .1)]
    ConfigParseError(&'a Path, #[source] toml::de::Error),
    /// Returned when neither the config file nor the command line names the console.
    #[error("no console address given, use --host or set host in the config file")]
    MissingHost,
    /// An error returned when a local 'param.sfo' file can't be parsed or patched.
    #[error("failed to process sfo file at {}: {}", .0.display(), .1)]
    SfoError(&'a Path, #[source] SfoError),
    /// An error returned when a local image can't be decoded or prepared for upload.
    #[error("{0}")]
    Asset(#[from] AssetError),
    /// An error returned by a remote operation.
    #[error("{0}")]
    Sync(#[from] SyncError),
    /// An error returned by a remote listing or delete.
    #[error("{0}")]
    Transport(#[from] TransportError),
    /// Returned when a remote title lookup fell back to a placeholder.
    #[error("couldn't read the title of {0}")]
    NoTitle(String),
}
