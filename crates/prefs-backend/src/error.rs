//! Error types for backing stores

use std::path::PathBuf;

/// Errors raised by a backing store
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// IO error while reading or writing the store file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store file content is not a valid snapshot
    #[error("malformed store file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background writer is gone
    #[error("store writer unavailable: {0}")]
    WriterUnavailable(String),

    /// Commit rejected by the store
    #[error("commit rejected: {0}")]
    CommitRejected(String),
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create malformed-file error for path
    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
