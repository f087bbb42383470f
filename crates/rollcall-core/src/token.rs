//! Time-windowed proof-of-presence tokens.
//!
//! A presenter displays a QR code carrying a token bound to one activity and
//! the current 30-second window. Tokens are HMAC-SHA256 over
//! `"{activity_id}:{window}"`, keyed with the deployment's server secret and
//! hex-encoded. A token is accepted during its own window and the one after
//! it, so a captured code is worth at most 60 seconds.
//!
//! Every verifier instance in a deployment must hold the same secret. A
//! mismatch does not error; it silently rejects every scan.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::types::ActivityId;

type HmacSha256 = Hmac<Sha256>;

/// Length of one token rotation window.
pub const WINDOW_MILLIS: i64 = 30_000;

/// Length of a hex-encoded token.
pub const TOKEN_HEX_LEN: usize = 64;

/// Map a unix-millisecond timestamp to its rotation window.
pub fn window_of(now_millis: i64) -> i64 {
    now_millis.div_euclid(WINDOW_MILLIS)
}

/// The token signing key.
///
/// Read-only after startup. `Debug` never prints the key material.
#[derive(Clone)]
pub struct ServerSecret(Vec<u8>);

impl ServerSecret {
    /// Minimum accepted key length in bytes.
    pub const MIN_LEN: usize = 16;

    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(CoreError::SecretTooShort {
                min: Self::MIN_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerSecret(<redacted>)")
    }
}

/// A hex-encoded check-in token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CheckinToken(String);

impl CheckinToken {
    /// Wrap a token string if it has the shape of an issued token.
    ///
    /// Shape only; says nothing about validity.
    pub fn parse(s: &str) -> Option<Self> {
        is_well_formed(s).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CheckinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckinToken({}...)", &self.0[..self.0.len().min(12)])
    }
}

impl fmt::Display for CheckinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_HEX_LEN && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Issues and verifies check-in tokens with an injected secret.
#[derive(Clone)]
pub struct TokenCodec {
    keyed: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &ServerSecret) -> Result<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
            CoreError::SecretTooShort {
                min: ServerSecret::MIN_LEN,
                got: secret.as_bytes().len(),
            }
        })?;
        Ok(Self { keyed })
    }

    /// Issue the token for `activity` at `now_millis`.
    pub fn issue(&self, activity: ActivityId, now_millis: i64) -> CheckinToken {
        let mac = self.mac_for(activity, window_of(now_millis));
        CheckinToken(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check `token` against the current window and the one before it.
    ///
    /// Malformed tokens are rejected before any MAC is computed. Both windows
    /// are always checked, in constant time.
    pub fn verify(&self, activity: ActivityId, token: &str, now_millis: i64) -> bool {
        if !is_well_formed(token) {
            return false;
        }
        let Ok(raw) = hex::decode(token) else {
            return false;
        };

        let window = window_of(now_millis);
        let current = self.mac_for(activity, window).verify_slice(&raw).is_ok();
        let previous = self.mac_for(activity, window - 1).verify_slice(&raw).is_ok();
        current | previous
    }

    fn mac_for(&self, activity: ActivityId, window: i64) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(format!("{}:{}", activity.get(), window).as_bytes());
        mac
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenCodec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&ServerSecret::new(b"test-secret-0123456789".to_vec()).unwrap()).unwrap()
    }

    #[test]
    fn test_secret_too_short() {
        assert!(matches!(
            ServerSecret::new(b"short".to_vec()),
            Err(CoreError::SecretTooShort { min: 16, got: 5 })
        ));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = ServerSecret::new(b"super-secret-value!".to_vec()).unwrap();
        assert!(!format!("{:?}", secret).contains("super"));
    }

    #[test]
    fn test_window_boundaries() {
        assert_eq!(window_of(0), 0);
        assert_eq!(window_of(29_999), 0);
        assert_eq!(window_of(30_000), 1);
        assert_eq!(window_of(-1), -1);
    }

    #[test]
    fn test_token_shape() {
        let token = codec().issue(ActivityId(1), 1_700_000_000_000);
        assert_eq!(token.as_str().len(), TOKEN_HEX_LEN);
        assert!(CheckinToken::parse(token.as_str()).is_some());
    }

    #[test]
    fn test_grace_window() {
        let codec = codec();
        let t = 1_700_000_000_000;
        let token = codec.issue(ActivityId(9), t);
        assert!(codec.verify(ActivityId(9), token.as_str(), t + 31_000));
        assert!(!codec.verify(ActivityId(9), token.as_str(), t + 61_000));
    }

    #[test]
    fn test_window_plus_two_rejected() {
        let codec = codec();
        let window_start = 56_666_667 * WINDOW_MILLIS;
        let token = codec.issue(ActivityId(3), window_start);
        assert!(codec.verify(ActivityId(3), token.as_str(), window_start + WINDOW_MILLIS));
        assert!(!codec.verify(ActivityId(3), token.as_str(), window_start + 2 * WINDOW_MILLIS));
    }

    #[test]
    fn test_future_token_rejected() {
        let codec = codec();
        let t = 1_700_000_000_000;
        let token = codec.issue(ActivityId(3), t + WINDOW_MILLIS);
        assert!(!codec.verify(ActivityId(3), token.as_str(), t));
    }

    #[test]
    fn test_wrong_activity_rejected() {
        let codec = codec();
        let t = 1_700_000_000_000;
        let token = codec.issue(ActivityId(1), t);
        assert!(!codec.verify(ActivityId(2), token.as_str(), t));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other =
            TokenCodec::new(&ServerSecret::new(b"another-secret-987654".to_vec()).unwrap())
                .unwrap();
        let t = 1_700_000_000_000;
        let token = codec().issue(ActivityId(1), t);
        assert!(!other.verify(ActivityId(1), token.as_str(), t));
    }

    #[test]
    fn test_malformed_rejected() {
        let codec = codec();
        let t = 1_700_000_000_000;
        let token = codec.issue(ActivityId(1), t);
        assert!(!codec.verify(ActivityId(1), "", t));
        assert!(!codec.verify(ActivityId(1), &token.as_str()[..63], t));
        assert!(!codec.verify(ActivityId(1), &token.as_str().to_uppercase(), t));
        assert!(!codec.verify(ActivityId(1), &"z".repeat(64), t));
    }

    proptest! {
        #[test]
        fn prop_issue_then_verify(activity in 1i64..1_000_000, t in 0i64..4_000_000_000_000) {
            let codec = codec();
            let token = codec.issue(ActivityId(activity), t);
            prop_assert!(codec.verify(ActivityId(activity), token.as_str(), t));
        }

        #[test]
        fn prop_issue_is_deterministic(activity in 1i64..1_000_000, t in 0i64..4_000_000_000_000) {
            let codec = codec();
            prop_assert_eq!(codec.issue(ActivityId(activity), t), codec.issue(ActivityId(activity), t));
        }
    }
}
