//! Public-key "box" and symmetric "secretbox" sealing.
//!
//! Both shapes produce `nonce(24) ‖ ciphertext+tag` with a fresh random
//! nonce, over XChaCha20-Poly1305.
//!
//! The box key schedule is direction-symmetric:
//!
//! ```text
//! box_key = HKDF-SHA256(X25519(my_secret, their_public), info = "burrow/v1/box-key")
//! ```
//!
//! so `box_seal(to = B, from = a, m)` opens with `box_open(from = A, to = b, c)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::hkdf::hkdf_sha256_32;
use crate::x25519::{X25519PublicKey, X25519StaticSecret};
use crate::{CryptoError, Result};

/// Nonce size (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

const BOX_KEY_INFO: &[u8] = b"burrow/v1/box-key";

fn box_key(secret: &X25519StaticSecret, public: &X25519PublicKey) -> [u8; KEY_SIZE] {
    let shared = secret.diffie_hellman(public);
    hkdf_sha256_32(shared.as_bytes(), BOX_KEY_INFO)
}

fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ct = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::AeadDecryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

fn open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::AeadDecryption);
    }
    let (nonce, ct) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), ct)
        .map_err(|_| CryptoError::AeadDecryption)
}

/// Seal a message to `to`, authenticated as coming from `from`.
pub fn box_seal(
    to: &X25519PublicKey,
    from: &X25519StaticSecret,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    seal(&box_key(from, to), plaintext)
}

/// Open a sealed box from `from`, addressed to `to`.
pub fn box_open(
    from: &X25519PublicKey,
    to: &X25519StaticSecret,
    sealed: &[u8],
) -> Result<Vec<u8>> {
    open(&box_key(to, from), sealed)
}

/// Seal a message under a 32-byte symmetric key.
pub fn secretbox_seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    seal(key, plaintext)
}

/// Open a message sealed under a 32-byte symmetric key.
pub fn secretbox_open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
    open(key, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_roundtrip() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();

        let sealed = box_seal(&bob.public_key(), &alice, b"hello bob").expect("seal");
        let opened = box_open(&alice.public_key(), &bob, &sealed).expect("open");
        assert_eq!(opened, b"hello bob");
    }

    #[test]
    fn test_box_layout() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();
        let sealed = box_seal(&bob.public_key(), &alice, b"msg").expect("seal");
        assert_eq!(sealed.len(), NONCE_SIZE + 3 + TAG_SIZE);
    }

    #[test]
    fn test_box_wrong_recipient_fails() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();
        let carol = X25519StaticSecret::random();

        let sealed = box_seal(&bob.public_key(), &alice, b"secret").expect("seal");
        assert!(box_open(&alice.public_key(), &carol, &sealed).is_err());
    }

    #[test]
    fn test_box_wrong_sender_fails() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();
        let carol = X25519StaticSecret::random();

        let sealed = box_seal(&bob.public_key(), &alice, b"secret").expect("seal");
        assert!(box_open(&carol.public_key(), &bob, &sealed).is_err());
    }

    #[test]
    fn test_box_tampered_fails() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();

        let mut sealed = box_seal(&bob.public_key(), &alice, b"secret").expect("seal");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(box_open(&alice.public_key(), &bob, &sealed).is_err());
    }

    #[test]
    fn test_secretbox_roundtrip() {
        let key = [0x42u8; KEY_SIZE];
        let sealed = secretbox_seal(&key, b"payload").expect("seal");
        let opened = secretbox_open(&key, &sealed).expect("open");
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_secretbox_wrong_key_fails() {
        let sealed = secretbox_seal(&[0x01u8; KEY_SIZE], b"payload").expect("seal");
        assert!(secretbox_open(&[0x02u8; KEY_SIZE], &sealed).is_err());
    }

    #[test]
    fn test_secretbox_truncated_fails() {
        let sealed = secretbox_seal(&[0x01u8; KEY_SIZE], b"payload").expect("seal");
        assert!(secretbox_open(&[0x01u8; KEY_SIZE], &sealed[..NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = [0x42u8; KEY_SIZE];
        let a = secretbox_seal(&key, b"same").expect("seal");
        let b = secretbox_seal(&key, b"same").expect("seal");
        assert_ne!(a, b);
    }
}
