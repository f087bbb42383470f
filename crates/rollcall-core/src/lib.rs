//! # Rollcall Core
//!
//! Pure primitives for Rollcall: check-in tokens, QR payloads, identifiers,
//! and the event / activity / enrollment model.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`TokenCodec`] - Issues and verifies time-windowed check-in tokens
//! - [`CheckinPayload`] - The `CHECKIN:<event>:<activity>:<token>` QR content
//! - [`VerificationHash`] - Durable public key of an issued certificate
//! - [`Enrollment`] - A participant's record in one activity
//! - [`CertificateTemplate`] - Percent-positioned certificate layout
//!
//! ## Tokens
//!
//! ```rust
//! use rollcall_core::{ActivityId, ServerSecret, TokenCodec};
//!
//! let secret = ServerSecret::new(b"0123456789abcdef0123".to_vec()).unwrap();
//! let codec = TokenCodec::new(&secret).unwrap();
//! let token = codec.issue(ActivityId(7), 1_700_000_000_000);
//! assert!(codec.verify(ActivityId(7), token.as_str(), 1_700_000_020_000));
//! ```

pub mod clock;
pub mod error;
pub mod geo;
pub mod model;
pub mod payload;
pub mod template;
pub mod token;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use geo::GeoPoint;
pub use model::{
    Activity, AttendanceState, Background, Capacity, DeliveryStatus, Enrollment, Event,
    EventKind, EventStatus, NewActivity, NewEvent, Participant, generate_share_token,
    FAST_CHECKIN_ACTIVITY_NAME,
};
pub use payload::{CheckinPayload, CHECKIN_PREFIX};
pub use template::{Align, Block, CertificateTemplate, QrBlock, TemplateElement, TextBlock};
pub use token::{window_of, CheckinToken, ServerSecret, TokenCodec, WINDOW_MILLIS};
pub use types::{
    ActivityId, EnrollmentId, EventId, ParticipantId, VerificationHash, VERIFICATION_HASH_LEN,
};
