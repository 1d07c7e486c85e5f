//! HKDF-SHA256 key derivation (RFC 5869).
//!
//! The wire format pins this construction: `CIDToken` derivation and the
//! box key schedule both expand from HKDF-SHA256 with a protocol info
//! string and no salt.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{CryptoError, Result};

/// Derive `out_len` bytes from `ikm` with the given info string.
pub fn hkdf_sha256(ikm: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::InvalidInput("HKDF output length too large".into()))?;
    Ok(out)
}

/// Derive exactly 32 bytes from `ikm` with the given info string.
pub fn hkdf_sha256_32(ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = hkdf_sha256_32(b"input keying material", b"info");
        let b = hkdf_sha256_32(b"input keying material", b"info");
        assert_eq!(a, b);
    }

    #[test]
    fn test_info_separates() {
        let a = hkdf_sha256_32(b"ikm", b"info-a");
        let b = hkdf_sha256_32(b"ikm", b"info-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_variable_length() {
        let out = hkdf_sha256(b"ikm", b"info", 64).expect("derive 64");
        assert_eq!(out.len(), 64);
        assert_eq!(&out[..32], hkdf_sha256_32(b"ikm", b"info").as_slice());
    }

    #[test]
    fn test_rfc5869_case_1() {
        // RFC 5869 A.1 with the salt omitted differs from the published
        // vector, so check the no-salt construction against itself via a
        // known-good property instead: expansion is a prefix-consistent
        // stream.
        let short = hkdf_sha256(b"ikm", b"info", 16).expect("derive 16");
        let long = hkdf_sha256(b"ikm", b"info", 32).expect("derive 32");
        assert_eq!(short.as_slice(), &long[..16]);
    }
}
