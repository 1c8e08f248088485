use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for statwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for statwatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors that are not attributable to a single path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A filesystem call on a specific path failed
    #[error("I/O error on {}: {source}", .path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// API misuse, e.g. augmenting a record outside of a walk
    #[error("Usage error: {0}")]
    Usage(String),

    /// A filesystem call exceeded the configured deadline
    #[error("{operation} on {} timed out after {elapsed:?}", .path.display())]
    Timeout {
        operation: &'static str,
        path: PathBuf,
        elapsed: Duration,
    },

    /// Symlink resolution revisited a path or ran out of hops
    #[error("Too many levels of symbolic links resolving {} ({hops} hops)", .path.display())]
    SymlinkLoop { path: PathBuf, hops: usize },

    /// An augmentation task resolved to an error
    #[error("Augmentation of {} failed: {source}", .path.display())]
    Augmentation {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Watcher lifecycle errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Creates a watcher error
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Attaches the failing path to an I/O error
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }

    /// Creates an augmentation failure for `path`
    pub fn augmentation<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Augmentation {
            path: path.into(),
            source: source.into(),
        }
    }

    /// The underlying I/O error kind, if this error wraps one
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e) | Self::PathIo { source: e, .. } => Some(e.kind()),
            _ => None,
        }
    }
}
