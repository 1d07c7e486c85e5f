//! # burrow-rrid
//!
//! Rerandomizable identifiers for mailbox routing.
//!
//! A mailbox hands its customers a token that senders attach to every
//! delivery. Senders rerandomize the token before each use, so two
//! deliveries to the same customer are unlinkable to anyone but the
//! mailbox, which holds the private key and can map any rerandomization
//! back to the same stable `tokenid`.
//!
//! The construction is ElGamal over the Ristretto group. A token is
//! `X ‖ C1 ‖ C2` (three compressed points, 96 bytes): `X` is the token's
//! public key, and `(C1, C2) = (r·B, T + r·X)` encrypts the identity point
//! `T`. Anyone can rerandomize by adding `(s·B, s·X)`; the key holder
//! recovers `T = C2 − x·C1` and compresses it to the 32-byte `tokenid`.
//!
//! Tokens are deliberately **malleable**: a bit-flipped token may fail to
//! parse or may decrypt to a *different* tokenid. `decrypt` output is not
//! integrity-checked and callers must treat any unknown result as
//! "unrecognized", never as proof of origin.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;

/// Length of a stable token identity in bytes.
pub const TOKENID_LENGTH: usize = 32;

/// Length of a private key in bytes.
pub const PRIVKEY_LENGTH: usize = 32;

/// Length of a (rerandomizable) token in bytes.
pub const TOKEN_LENGTH: usize = 96;

/// Error types for token operations.
#[derive(Debug, thiserror::Error)]
pub enum RridError {
    /// The token is not three valid compressed group elements.
    #[error("malformed token")]
    InvalidToken,

    /// The private key is not a canonical scalar.
    #[error("malformed private key")]
    InvalidKey,
}

pub type Result<T> = std::result::Result<T, RridError>;

struct Token {
    public: RistrettoPoint,
    c1: RistrettoPoint,
    c2: RistrettoPoint,
}

fn parse_point(bytes: &[u8]) -> Result<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes)
        .map_err(|_| RridError::InvalidToken)?
        .decompress()
        .ok_or(RridError::InvalidToken)
}

fn parse_token(token: &[u8]) -> Result<Token> {
    if token.len() != TOKEN_LENGTH {
        return Err(RridError::InvalidToken);
    }
    Ok(Token {
        public: parse_point(&token[..32])?,
        c1: parse_point(&token[32..64])?,
        c2: parse_point(&token[64..])?,
    })
}

fn encode_token(token: &Token) -> [u8; TOKEN_LENGTH] {
    let mut out = [0u8; TOKEN_LENGTH];
    out[..32].copy_from_slice(&token.public.compress().to_bytes());
    out[32..64].copy_from_slice(&token.c1.compress().to_bytes());
    out[64..].copy_from_slice(&token.c2.compress().to_bytes());
    out
}

/// Create a fresh identity: `(tokenid, privkey, token0)`.
///
/// `token0` is the initial token; hand it out and let senders rerandomize.
pub fn create() -> (
    [u8; TOKENID_LENGTH],
    [u8; PRIVKEY_LENGTH],
    [u8; TOKEN_LENGTH],
) {
    let x = Scalar::random(&mut OsRng);
    let public = RistrettoPoint::mul_base(&x);

    let t = Scalar::random(&mut OsRng);
    let identity_point = RistrettoPoint::mul_base(&t);
    let tokenid = identity_point.compress().to_bytes();

    let r = Scalar::random(&mut OsRng);
    let token0 = encode_token(&Token {
        public,
        c1: RistrettoPoint::mul_base(&r),
        c2: identity_point + r * public,
    });

    (tokenid, x.to_bytes(), token0)
}

/// Rerandomize a token.
///
/// The result decrypts to the same tokenid under the same private key but
/// is unlinkable to the input for anyone without that key.
pub fn randomize(token: &[u8]) -> Result<[u8; TOKEN_LENGTH]> {
    let parsed = parse_token(token)?;
    let s = Scalar::random(&mut OsRng);
    Ok(encode_token(&Token {
        public: parsed.public,
        c1: parsed.c1 + RistrettoPoint::mul_base(&s),
        c2: parsed.c2 + s * parsed.public,
    }))
}

/// Recover the stable tokenid from any rerandomization of a token.
///
/// The output carries no integrity: a mangled-but-parseable token yields a
/// tokenid that simply matches nothing.
pub fn decrypt(privkey: &[u8; PRIVKEY_LENGTH], token: &[u8]) -> Result<[u8; TOKENID_LENGTH]> {
    let x: Scalar =
        Option::from(Scalar::from_canonical_bytes(*privkey)).ok_or(RridError::InvalidKey)?;
    let parsed = parse_token(token)?;
    let identity_point = parsed.c2 - x * parsed.c1;
    Ok(identity_point.compress().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn flip_last_bit(token: &[u8; TOKEN_LENGTH]) -> [u8; TOKEN_LENGTH] {
        let mut out = *token;
        out[TOKEN_LENGTH - 1] ^= 0x01;
        out
    }

    #[test]
    fn test_create_shapes() {
        let (tokenid, privkey, token0) = create();
        assert_eq!(tokenid.len(), TOKENID_LENGTH);
        assert_eq!(privkey.len(), PRIVKEY_LENGTH);
        assert_eq!(token0.len(), TOKEN_LENGTH);
    }

    #[test]
    fn test_rerandomizations_are_distinct() {
        let (_, _, token0) = create();
        let token1 = randomize(&token0).expect("randomize");
        let token2 = randomize(&token1).expect("randomize");

        let distinct: BTreeSet<_> = [token0, token1, token2].into_iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_decrypt_survives_rerandomization() {
        let (tokenid, privkey, token0) = create();
        let token1 = randomize(&token0).expect("randomize");
        let token2 = randomize(&token1).expect("randomize");

        assert_eq!(decrypt(&privkey, &token0).expect("decrypt"), tokenid);
        assert_eq!(decrypt(&privkey, &token1).expect("decrypt"), tokenid);
        assert_eq!(decrypt(&privkey, &token2).expect("decrypt"), tokenid);
    }

    #[test]
    fn test_corrupt_token_is_unrecognized() {
        let (tokenid, privkey, token0) = create();
        let token1 = randomize(&token0).expect("randomize");

        // Tokens are malleable: the flipped token either fails to parse or
        // maps to some other identity. Both count as "unrecognized".
        match decrypt(&privkey, &flip_last_bit(&token1)) {
            Ok(other) => assert_ne!(other, tokenid),
            Err(RridError::InvalidToken) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_cross_key_mismatch() {
        let (tokenid, privkey, token0) = create();
        let (other_tokenid, other_privkey, other_token0) = create();
        let token1 = randomize(&token0).expect("randomize");
        let other_token1 = randomize(&other_token0).expect("randomize");

        assert_ne!(
            decrypt(&other_privkey, &token1).expect("decrypt"),
            other_tokenid
        );
        assert_ne!(
            decrypt(&privkey, &other_token1).expect("decrypt"),
            tokenid
        );
    }

    #[test]
    fn test_wrong_length_rejected() {
        let (_, privkey, token0) = create();
        assert!(matches!(
            decrypt(&privkey, &token0[..64]),
            Err(RridError::InvalidToken)
        ));
        assert!(matches!(randomize(&[0u8; 12]), Err(RridError::InvalidToken)));
    }
}
