//! SHA-256 hashing.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_vector() {
        // SHA-256("") from FIPS 180-4.
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .expect("valid hex");
        assert_eq!(hash(b"").as_slice(), expected.as_slice());
    }

    #[test]
    fn test_abc_vector() {
        let expected =
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .expect("valid hex");
        assert_eq!(hash(b"abc").as_slice(), expected.as_slice());
    }
}
