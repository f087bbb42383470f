//! Golden check-in token vectors.
//!
//! Each token is HMAC-SHA256 over `"{activity}:{window}"` with
//! `window = floor(now_millis / 30000)`, hex-encoded. Any conforming
//! verifier must reproduce them exactly.

use rollcall_core::{ActivityId, ServerSecret, TokenCodec};

/// A golden token vector.
#[derive(Debug, Clone)]
pub struct TokenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub secret: &'static [u8],
    pub activity: ActivityId,
    pub now_millis: i64,
    /// `floor(now_millis / 30000)`.
    pub window: i64,
    pub expected_token: &'static str,
}

/// Get all golden token vectors.
pub fn all_token_vectors() -> Vec<TokenVector> {
    vec![
        TokenVector {
            name: "activity 7 at 1.7e12",
            secret: b"rollcall-test-secret-0001",
            activity: ActivityId(7),
            now_millis: 1_700_000_000_000,
            window: 56_666_666,
            expected_token: "a467d5e10bca52156894120fe3704f02e24a0b4a9102aa51c050bbaf5c43eecc",
        },
        TokenVector {
            name: "activity 7, last millisecond of the next window",
            secret: b"rollcall-test-secret-0001",
            activity: ActivityId(7),
            now_millis: 1_700_000_029_999,
            window: 56_666_667,
            expected_token: "cbd9998738605eb413785364a328fcb6564e083428795a75d58e26f545d4a7fa",
        },
        TokenVector {
            name: "activity 8, same window as the first vector",
            secret: b"rollcall-test-secret-0001",
            activity: ActivityId(8),
            now_millis: 1_700_000_000_000,
            window: 56_666_666,
            expected_token: "2ed3a12b749597b0fd03db8d2bc2eb555b51a487514872e6f0e5b19934741eed",
        },
        TokenVector {
            name: "epoch",
            secret: b"another-secret-for-vectors",
            activity: ActivityId(1),
            now_millis: 0,
            window: 0,
            expected_token: "7395aae36e6b9a1f42b0d6787281cc91fd09792255ae1dd5f2b410d38073a779",
        },
        TokenVector {
            name: "2026-01-01T00:00:00Z, large activity id",
            secret: b"another-secret-for-vectors",
            activity: ActivityId(123_456),
            now_millis: 1_767_225_600_000,
            window: 58_907_520,
            expected_token: "f7acf2153fac2545c575aaf0878b190e6928805405fd789a6dfe0c81242189df",
        },
    ]
}

/// The codec for a vector's secret.
pub fn codec_for(vector: &TokenVector) -> TokenCodec {
    let secret = ServerSecret::new(vector.secret.to_vec()).expect("vector secret is long enough");
    TokenCodec::new(&secret).expect("vector secret is a valid key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::window_of;

    #[test]
    fn test_vectors_match_codec() {
        for v in all_token_vectors() {
            assert_eq!(window_of(v.now_millis), v.window, "{}", v.name);
            let codec = codec_for(&v);
            let token = codec.issue(v.activity, v.now_millis);
            assert_eq!(token.as_str(), v.expected_token, "{}", v.name);
            assert!(codec.verify(v.activity, v.expected_token, v.now_millis));
        }
    }

    #[test]
    fn test_vectors_are_distinct() {
        let vectors = all_token_vectors();
        for (i, a) in vectors.iter().enumerate() {
            for b in &vectors[i + 1..] {
                assert_ne!(a.expected_token, b.expected_token, "{} vs {}", a.name, b.name);
            }
        }
    }
}
