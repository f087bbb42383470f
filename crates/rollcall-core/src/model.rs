//! Event, activity, enrollment and participant records.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geo::GeoPoint;
use crate::template::CertificateTemplate;
use crate::types::{ActivityId, EnrollmentId, EventId, ParticipantId, VerificationHash};

/// Name given to the single activity of a fast event.
pub const FAST_CHECKIN_ACTIVITY_NAME: &str = "Check-in Presença";

/// Random bytes in an event's public share token.
pub const SHARE_TOKEN_BYTES: usize = 12;

/// Generate a public share token for a new event.
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; SHARE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Seat limit of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    Unlimited,
    Limited(u32),
}

impl Capacity {
    /// Column encoding: `-1` for unlimited.
    pub fn to_column(self) -> i64 {
        match self {
            Capacity::Unlimited => -1,
            Capacity::Limited(n) => n as i64,
        }
    }

    pub fn from_column(value: i64) -> Self {
        if value < 0 {
            Capacity::Unlimited
        } else {
            Capacity::Limited(value.min(u32::MAX as i64) as u32)
        }
    }

    /// Whether one more enrollment fits when `current` already exist.
    pub fn admits(self, current: u64) -> bool {
        match self {
            Capacity::Unlimited => true,
            Capacity::Limited(n) => current < n as u64,
        }
    }
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Activities with registration.
    Standard,
    /// A single check-in activity, no registration step.
    Fast,
}

text_enum!(EventKind, "event kind", { Standard => "PADRAO", Fast => "RAPIDO" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Open,
    Closed,
}

text_enum!(EventStatus, "event status", { Open => "ABERTO", Closed => "ENCERRADO" });

/// Certificate delivery progress of an enrollment.
///
/// `Enqueued` is set when the task is published; the worker's confirmation
/// moves it to `Delivered` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Enqueued,
    Delivered,
    Failed,
}

text_enum!(DeliveryStatus, "delivery status", {
    Pending => "pending",
    Enqueued => "enqueued",
    Delivered => "delivered",
    Failed => "failed",
});

/// A background image reference with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    pub reference: String,
    pub width_px: u32,
    pub height_px: u32,
}

/// A user as seen through the directory interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub kind: EventKind,
    /// ISO `YYYY-MM-DD`.
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    pub share_token: String,
    pub status: EventStatus,
    pub geofence: Option<GeoPoint>,
    pub background: Option<Background>,
    pub template: Option<CertificateTemplate>,
}

/// Fields for creating an event. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub owner: String,
    pub name: String,
    pub description: String,
    pub kind: EventKind,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
    pub share_token: String,
    pub geofence: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub event_id: EventId,
    pub name: String,
    pub speaker: String,
    pub location: String,
    pub description: String,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Workload credited on attendance.
    pub hours: u32,
    pub capacity: Capacity,
    pub geofence: Option<GeoPoint>,
    /// Scanning the code both enrolls and marks attendance.
    pub fast_checkin: bool,
}

/// Fields for creating an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub name: String,
    pub speaker: String,
    pub location: String,
    pub description: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub hours: u32,
    pub capacity: Capacity,
    pub geofence: Option<GeoPoint>,
    pub fast_checkin: bool,
}

impl NewActivity {
    /// The default activity of a fast event.
    pub fn fast_checkin_for(event: &NewEvent) -> Self {
        Self {
            name: FAST_CHECKIN_ACTIVITY_NAME.to_string(),
            speaker: String::new(),
            location: String::new(),
            description: "Registro de presença.".to_string(),
            date: event.start_date.clone(),
            time: event.start_time.clone(),
            hours: 0,
            capacity: Capacity::Unlimited,
            geofence: event.geofence,
            fast_checkin: true,
        }
    }
}

/// Position of a (activity, participant) pair in the attendance lifecycle.
///
/// `Unregistered` is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceState {
    Unregistered,
    Registered,
    Attended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub activity_id: ActivityId,
    pub event_id: EventId,
    pub participant_id: ParticipantId,
    /// Display name captured when the record was created.
    pub participant_name: String,
    pub attended: bool,
    pub alternate_address: Option<String>,
    pub verification_hash: Option<VerificationHash>,
    pub checkin_location: Option<GeoPoint>,
    pub delivery_status: DeliveryStatus,
    /// Unix ms of the last enqueue or delivery confirmation.
    pub delivered_at: Option<i64>,
    pub created_at: i64,
}

impl Enrollment {
    pub fn state(&self) -> AttendanceState {
        if self.attended {
            AttendanceState::Attended
        } else {
            AttendanceState::Registered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_column_encoding() {
        assert_eq!(Capacity::Unlimited.to_column(), -1);
        assert_eq!(Capacity::from_column(-1), Capacity::Unlimited);
        assert_eq!(Capacity::from_column(0), Capacity::Limited(0));
        assert_eq!(Capacity::from_column(25).to_column(), 25);
    }

    #[test]
    fn test_capacity_admits() {
        assert!(Capacity::Unlimited.admits(u64::MAX));
        assert!(Capacity::Limited(1).admits(0));
        assert!(!Capacity::Limited(1).admits(1));
        assert!(!Capacity::Limited(0).admits(0));
    }

    #[test]
    fn test_share_tokens_differ() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_eq!(a.len(), SHARE_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_text_enums() {
        assert_eq!(EventKind::parse("RAPIDO").unwrap(), EventKind::Fast);
        assert_eq!(DeliveryStatus::Enqueued.as_str(), "enqueued");
        assert!(EventStatus::parse("???").is_err());
    }

    #[test]
    fn test_fast_checkin_activity_inherits_event() {
        let event = NewEvent {
            owner: "prof".into(),
            name: "Semana".into(),
            description: String::new(),
            kind: EventKind::Fast,
            start_date: Some("2026-10-10".into()),
            start_time: Some("08:00".into()),
            end_date: None,
            end_time: None,
            share_token: "abc".into(),
            geofence: Some(GeoPoint { lat: 1.0, lon: 2.0 }),
        };
        let activity = NewActivity::fast_checkin_for(&event);
        assert!(activity.fast_checkin);
        assert_eq!(activity.capacity, Capacity::Unlimited);
        assert_eq!(activity.hours, 0);
        assert_eq!(activity.date.as_deref(), Some("2026-10-10"));
        assert_eq!(activity.geofence, event.geofence);
    }
}
