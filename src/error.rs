use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Errors that can occur while rotating or retaining log files
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The live file could not be created or opened.
    #[error("failed to open {} for log: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Flushing or closing the live file failed; nothing was renamed.
    #[error("failed to close {} before rotation: {source}", path.display())]
    Close {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The live file could not be renamed aside; it is left untouched.
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The live file was moved aside but a new one could not be opened.
    #[error(
        "rotated {} into {} but could not reopen it, writes are being dropped: {source}",
        path.display(),
        rotated.display()
    )]
    ReopenAfterRotate {
        path: PathBuf,
        rotated: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A rotated copy could not be gzip-compressed.
    #[error("failed to compress {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Listing the log directory failed.
    #[error("failed to read directory {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Inspecting a single directory entry failed.
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// An expired or excess rotated copy could not be deleted.
    #[error("failed to remove rotated log {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),
    /// A rotation timestamp could not be rendered.
    #[error("Time error: {0}")]
    Time(#[from] time::error::Format),
}

impl Error {
    /// Whether the handle is left without a sink and needs operator attention.
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::ReopenAfterRotate { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
