use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by `layerfs` operations.
///
/// Variants map to the error kinds in the design document rather than to
/// any particular backend; callers that need to react differently to, say,
/// a missing file versus a symlink rejection can match on these directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("virtual path not found: {path}")]
    NotFound { path: String },

    #[error("host filesystem operation on {path} failed: {source}")]
    HostIo { path: PathBuf, source: io::Error },

    #[error("refused to follow symlink at {path}")]
    SecurityViolation { path: PathBuf },

    #[error("operation attempted on a vfs already marked for cleanup")]
    AlreadyCleanedUp,

    #[error("invalid virtual path: {reason}")]
    InvalidArgument { reason: String },
}

impl Error {
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    pub fn host_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::HostIo {
            path: path.into(),
            source,
        }
    }

    pub fn security_violation(path: impl Into<PathBuf>) -> Self {
        Error::SecurityViolation { path: path.into() }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// True for errors that represent "this path simply isn't there,"
    /// as opposed to a host I/O failure or security rejection. The
    /// dispatcher uses this to decide between a 404 and a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
