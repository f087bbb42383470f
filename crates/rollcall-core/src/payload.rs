//! The QR check-in payload: `CHECKIN:<eventId>:<activityId>:<token>`.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::token::CheckinToken;
use crate::types::{ActivityId, EventId};

/// Leading field of every check-in payload.
pub const CHECKIN_PREFIX: &str = "CHECKIN";

const FIELD_COUNT: usize = 4;

/// Decoded content of a presenter's QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinPayload {
    pub event_id: EventId,
    pub activity_id: ActivityId,
    pub token: CheckinToken,
}

impl fmt::Display for CheckinPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            CHECKIN_PREFIX, self.event_id, self.activity_id, self.token
        )
    }
}

impl FromStr for CheckinPayload {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        if fields.len() != FIELD_COUNT {
            return Err(CoreError::MalformedPayload(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            )));
        }
        if fields[0] != CHECKIN_PREFIX {
            return Err(CoreError::MalformedPayload("missing CHECKIN prefix".into()));
        }

        let event_id = fields[1]
            .parse::<i64>()
            .map_err(|_| CoreError::MalformedPayload("event id is not an integer".into()))?;
        let activity_id = fields[2]
            .parse::<i64>()
            .map_err(|_| CoreError::MalformedPayload("activity id is not an integer".into()))?;
        let token = CheckinToken::parse(fields[3])
            .ok_or_else(|| CoreError::MalformedPayload("token is not 64 hex chars".into()))?;

        Ok(Self {
            event_id: EventId(event_id),
            activity_id: ActivityId(activity_id),
            token,
        })
    }
}
