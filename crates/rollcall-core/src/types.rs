//! Strong type definitions for Rollcall.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Numeric
//! identifiers are store-assigned row ids; participants are referenced by an
//! external identifier owned by the user directory.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the raw row id.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Identifier of an event.
    EventId
);
row_id!(
    /// Identifier of an activity within an event.
    ActivityId
);
row_id!(
    /// Identifier of an enrollment record.
    EnrollmentId
);

/// External identifier of a participant (e.g. a national document number).
///
/// Users are never owned by this system; they are referenced by this id only.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap an external identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.0)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Number of characters in a verification hash.
pub const VERIFICATION_HASH_LEN: usize = 16;

/// Durable, opaque key binding a certificate to its (event, participant) pair.
///
/// Always [`VERIFICATION_HASH_LEN`] upper-case hex characters. Issued once on
/// first certificate render and never regenerated.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationHash(String);

impl VerificationHash {
    /// Parse a hash received from outside (e.g. a public lookup).
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != VERIFICATION_HASH_LEN {
            return Err(CoreError::MalformedHash(format!(
                "expected {} characters, got {}",
                VERIFICATION_HASH_LEN,
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F')) {
            return Err(CoreError::MalformedHash("expected upper-case hex".into()));
        }
        Ok(Self(s.to_string()))
    }

    /// Build a hash from the leading bytes of a digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = hex::encode_upper(digest);
        hex.truncate(VERIFICATION_HASH_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationHash({})", self.0)
    }
}

impl fmt::Display for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VerificationHash {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<VerificationHash> for String {
    fn from(hash: VerificationHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_display() {
        assert_eq!(format!("{}", ActivityId(7)), "7");
        assert_eq!(format!("{:?}", EventId(3)), "EventId(3)");
    }

    #[test]
    fn test_verification_hash_parse() {
        assert!(VerificationHash::parse("0123456789ABCDEF").is_ok());
        assert!(VerificationHash::parse("0123456789abcdef").is_err());
        assert!(VerificationHash::parse("0123456789ABCDE").is_err());
        assert!(VerificationHash::parse("0123456789ABCDEG").is_err());
    }

    #[test]
    fn test_verification_hash_from_digest_truncates() {
        let hash = VerificationHash::from_digest(&[0xab; 32]);
        assert_eq!(hash.as_str(), "ABABABABABABABAB");
        assert!(VerificationHash::parse(hash.as_str()).is_ok());
    }

    #[test]
    fn test_verification_hash_serde_rejects_malformed() {
        let ok: VerificationHash = serde_json::from_str("\"00000000000000FF\"").unwrap();
        assert_eq!(ok.as_str(), "00000000000000FF");
        assert!(serde_json::from_str::<VerificationHash>("\"nope\"").is_err());
    }
}
