//! Error types for the preference store
//!
//! Provides error handling for:
//! - Value decoding (always recovered locally by default substitution)
//! - Transaction protocol misuse (bulk/blocking mode)
//! - Durable commit failures
//! - Cross-thread construction

use prefs_backend::{BackendError, PrimitiveKind};

/// Failure to turn a stored primitive into a domain value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Stored primitive has another kind than the codec reads
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: PrimitiveKind,
        found: PrimitiveKind,
    },

    /// Stored string could not be parsed
    #[error("cannot parse {input:?}: {reason}")]
    Parse { input: String, reason: String },

    /// Stored JSON container is malformed
    #[error("malformed json container: {0}")]
    Json(String),
}

impl CodecError {
    /// Create type mismatch error
    pub fn type_mismatch(expected: PrimitiveKind, found: PrimitiveKind) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Create parse error
    pub fn parse(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Bulk/blocking protocol violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// `begin_bulk` while a bulk edit is already open
    #[error("bulk edit already active; nested bulk edits are not supported")]
    BulkAlreadyActive,

    /// `end_bulk`/`abort_bulk` without an open bulk edit
    #[error("no bulk edit is active")]
    BulkNotActive,
}

/// Main preference store error type
#[derive(Debug, thiserror::Error)]
pub enum PrefError {
    /// Transaction protocol misuse
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Blocking commit reported failure
    #[error("commit failed: {0}")]
    CommitFailed(#[source] BackendError),

    /// Backing store could not be opened or read
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Collection index out of range
    #[error("index {index} out of bounds for list of length {len} ({key})")]
    IndexOutOfBounds { key: String, index: usize, len: usize },

    /// Construction could not be marshalled to the designated thread
    #[error("construction on designated thread failed: {0}")]
    Marshal(String),

    /// Migration step failed; nothing it wrote was committed
    #[error("migration to version {target} failed: {reason}")]
    Migration { target: i32, reason: String },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl PrefError {
    /// Create migration error
    pub fn migration(target: i32, reason: impl ToString) -> Self {
        Self::Migration {
            target,
            reason: reason.to_string(),
        }
    }

    /// Whether the error reports a protocol violation by the caller
    #[inline]
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Transaction(_) | Self::IndexOutOfBounds { .. })
    }
}

/// Result type alias for preference operations
pub type PrefResult<T> = Result<T, PrefError>;
