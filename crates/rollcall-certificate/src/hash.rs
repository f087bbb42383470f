//! Verification hash derivation.
//!
//! A hash is the first 64 bits of a Blake3 digest over the event id, the
//! participant id and a fresh random salt. The salt makes the hash
//! unpredictable from the participant's identity alone.

use rand::RngCore;

use rollcall_core::{EventId, ParticipantId, VerificationHash};

/// Bytes of randomness mixed into every hash.
pub const SALT_LEN: usize = 16;

/// Derive a hash from explicit inputs.
pub fn derive_verification_hash(
    event: EventId,
    participant: &ParticipantId,
    salt: &[u8; SALT_LEN],
) -> VerificationHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"rollcall-certificate-v0:");
    hasher.update(&event.get().to_be_bytes());
    hasher.update(b":");
    hasher.update(participant.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(salt);
    VerificationHash::from_digest(hasher.finalize().as_bytes())
}

/// Derive a hash with a fresh random salt.
pub fn generate_verification_hash(event: EventId, participant: &ParticipantId) -> VerificationHash {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    derive_verification_hash(event, participant, &salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic_for_fixed_salt() {
        let p = ParticipantId::new("12345678900");
        let salt = [7u8; SALT_LEN];
        assert_eq!(
            derive_verification_hash(EventId(1), &p, &salt),
            derive_verification_hash(EventId(1), &p, &salt)
        );
    }

    #[test]
    fn test_inputs_change_the_hash() {
        let p = ParticipantId::new("12345678900");
        let salt = [7u8; SALT_LEN];
        let base = derive_verification_hash(EventId(1), &p, &salt);

        assert_ne!(base, derive_verification_hash(EventId(2), &p, &salt));
        assert_ne!(
            base,
            derive_verification_hash(EventId(1), &ParticipantId::new("1"), &salt)
        );
        assert_ne!(base, derive_verification_hash(EventId(1), &p, &[8u8; SALT_LEN]));
    }

    #[test]
    fn test_generated_hashes_are_well_formed_and_distinct() {
        let p = ParticipantId::new("p");
        let a = generate_verification_hash(EventId(1), &p);
        let b = generate_verification_hash(EventId(1), &p);
        assert!(VerificationHash::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }
}
