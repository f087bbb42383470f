//! Error types for Rollcall Core.

use thiserror::Error;

/// Errors raised while building or parsing core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("server secret must be at least {min} bytes, got {got}")]
    SecretTooShort { min: usize, got: usize },

    #[error("malformed check-in payload: {0}")]
    MalformedPayload(String),

    #[error("malformed verification hash: {0}")]
    MalformedHash(String),

    #[error("coordinates out of range: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("invalid certificate template: {0}")]
    InvalidTemplate(String),

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
