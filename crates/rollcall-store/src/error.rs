//! Ledger storage errors.

use rollcall_core::CoreError;
use thiserror::Error;

/// Errors from a ledger backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value failed to parse back into its domain type.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding shared state was poisoned by a panicking holder.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// The blocking task running the operation did not complete.
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
