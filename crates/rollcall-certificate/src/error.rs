//! Error types for the certificate module.

use thiserror::Error;

/// Errors that can occur while issuing or storing a certificate.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The participant attended no activity of the event.
    #[error("participant {participant} attended no activity of event {event}")]
    NoAttendance { event: String, participant: String },

    /// No free verification hash could be found.
    #[error("could not allocate a unique verification hash after {0} attempts")]
    HashExhausted(usize),

    /// The verification URL could not be encoded as a QR symbol.
    #[error("QR encoding failed: {0}")]
    Qr(String),

    /// A document key that is not safe to use as a storage name.
    #[error("invalid document key: {0}")]
    InvalidKey(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] rollcall_store::StoreError),

    /// I/O error from a document store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for certificate operations.
pub type Result<T> = std::result::Result<T, RenderError>;
