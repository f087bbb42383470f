//! Error types for the Rollcall service.

use rollcall_certificate::RenderError;
use rollcall_core::{ActivityId, CoreError, ParticipantId};
use rollcall_delivery::DeliveryError;
use rollcall_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Rollcall operations.
#[derive(Debug, Error)]
pub enum RollcallError {
    /// A referenced event, activity, enrollment or address does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The activity is full.
    #[error("activity {0} has reached its capacity")]
    CapacityExceeded(ActivityId),

    /// The scanned code is malformed, forged, for another event, or expired.
    #[error("invalid or expired code")]
    InvalidToken,

    /// Attendance was confirmed for someone who never registered.
    #[error("participant {participant} is not enrolled in activity {activity}")]
    NotEnrolled {
        activity: ActivityId,
        participant: ParticipantId,
    },

    /// A certificate was requested for a participant with no attendance.
    #[error("certificate precondition failed: {0}")]
    RenderPrecondition(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Core value error.
    #[error("invalid value: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Rendering error.
    #[error("render error: {0}")]
    Render(RenderError),

    /// Delivery pipeline error.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<RenderError> for RollcallError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::NoAttendance { .. } => Self::RenderPrecondition(e.to_string()),
            RenderError::Store(e) => Self::Store(e),
            other => Self::Render(other),
        }
    }
}

/// Result type for Rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;
