//! Error types for the delivery module.

use thiserror::Error;

/// Errors that can occur in the delivery pipeline.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A task could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from the durable queue.
    #[error("queue database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The queue connection string is not understood.
    #[error("invalid queue url: {0}")]
    InvalidQueueUrl(String),

    /// Ack or nack for a delivery the broker does not hold.
    #[error("unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    /// The broker can no longer deliver messages.
    #[error("broker closed")]
    Closed,

    /// A lock guarding broker state was poisoned.
    #[error("broker lock poisoned: {0}")]
    LockPoisoned(String),

    /// The blocking task running a queue operation did not complete.
    #[error("broker task failed: {0}")]
    Task(String),

    /// The mailer refused or failed to send.
    #[error("mail error: {0}")]
    Mail(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
