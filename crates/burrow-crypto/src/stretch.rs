//! Argon2id stretching of invitation codes.
//!
//! Both peers of a pairing derive the same Ed25519 seed from the shared
//! code, so the salt is a fixed protocol constant rather than a random
//! per-user value. Parameters are the moderate interactive profile; the
//! code is single-use and the derived key only authenticates a short-lived
//! rendezvous channel.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::{CryptoError, Result};

/// Fixed protocol salt for invite-code stretching (16 bytes).
pub const STRETCH_SALT: &[u8; 16] = b"burrow-invite-v1";

/// Memory cost in KiB (19 MiB).
pub const M_COST: u32 = 19_456;
/// Iteration count.
pub const T_COST: u32 = 2;
/// Parallelism lanes.
pub const P_COST: u32 = 1;
/// Output length: one Ed25519 seed.
pub const OUTPUT_LEN: usize = 32;

/// Stretch an invitation code into a 32-byte signing-key seed.
pub fn stretch_invite_code(code: &[u8]) -> Result<[u8; OUTPUT_LEN]> {
    let params = Params::new(M_COST, T_COST, P_COST, Some(OUTPUT_LEN))
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; OUTPUT_LEN];
    argon2
        .hash_password_into(code, STRETCH_SALT, &mut out)
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = stretch_invite_code(b"code").expect("stretch");
        let b = stretch_invite_code(b"code").expect("stretch");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_codes_differ() {
        let a = stretch_invite_code(b"code-one").expect("stretch");
        let b = stretch_invite_code(b"code-two").expect("stretch");
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_is_nonzero() {
        let out = stretch_invite_code(b"x").expect("stretch");
        assert_ne!(out, [0u8; OUTPUT_LEN]);
    }
}
