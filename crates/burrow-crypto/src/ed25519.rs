//! Ed25519 signing and verification (RFC 8032).
//!
//! Ed25519 carries all authentication in burrow: the code-derived invitation
//! key signs every rendezvous frame, and each channel's long-term signing key
//! authenticates the `msgE` ephemeral-key binding.
//!
//! Besides detached signatures this module provides the *attached* form used
//! on the wire — `sig(64) ‖ msg` — and [`verify_with_prefix`], which verifies
//! an attached signature and strips a required plaintext prefix in one step.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// Length of a detached Ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// An Ed25519 signing key (private key).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        let mut bytes = self.inner.to_bytes();
        bytes.zeroize();
    }
}

/// An Ed25519 verification key (public key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 detached signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from a 32-byte seed.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Get the raw seed bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Produce a detached signature over a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }

    /// Produce an attached signed message: `sig(64) ‖ msg`.
    pub fn sign_attached(&self, message: &[u8]) -> Vec<u8> {
        let sig = self.inner.sign(message);
        let mut out = Vec::with_capacity(SIGNATURE_LENGTH + message.len());
        out.extend_from_slice(&sig.to_bytes());
        out.extend_from_slice(message);
        out
    }
}

impl VerifyingKey {
    /// Create a verifying key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Get the raw bytes of this verifying key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }

    /// Verify a detached signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.inner
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }

    /// Verify an attached signed message (`sig(64) ‖ msg`), returning the
    /// inner message on success.
    pub fn verify_attached(&self, signed: &[u8]) -> Result<Vec<u8>> {
        if signed.len() < SIGNATURE_LENGTH {
            return Err(CryptoError::SignatureVerification);
        }
        let (sig_bytes, message) = signed.split_at(SIGNATURE_LENGTH);
        let sig_arr: [u8; SIGNATURE_LENGTH] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::SignatureVerification)?;
        let sig = ed25519_dalek::Signature::from_bytes(&sig_arr);
        self.inner
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerification)?;
        Ok(message.to_vec())
    }
}

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Get the raw bytes of this signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

/// Verify an attached signed message and require a plaintext prefix.
///
/// Returns the message body with the prefix stripped. A valid signature over
/// a message lacking the prefix yields [`CryptoError::BadPrefix`].
pub fn verify_with_prefix(
    key: &VerifyingKey,
    signed: &[u8],
    prefix: &[u8],
) -> Result<Vec<u8>> {
    let message = key.verify_attached(signed)?;
    if !message.starts_with(prefix) {
        return Err(CryptoError::BadPrefix);
    }
    Ok(message[prefix.len()..].to_vec())
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let sk = SigningKey::generate();
        let msg = b"rendezvous frame";
        let sig = sk.sign(msg);
        assert!(sk.verifying_key().verify(msg, &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let sk = SigningKey::generate();
        let sig = sk.sign(b"correct message");
        assert!(sk.verifying_key().verify(b"wrong message", &sig).is_err());
    }

    #[test]
    fn test_attached_roundtrip() {
        let sk = SigningKey::generate();
        let signed = sk.sign_attached(b"body");
        assert_eq!(signed.len(), SIGNATURE_LENGTH + 4);
        let message = sk
            .verifying_key()
            .verify_attached(&signed)
            .expect("verify attached");
        assert_eq!(message, b"body");
    }

    #[test]
    fn test_attached_tampered_fails() {
        let sk = SigningKey::generate();
        let mut signed = sk.sign_attached(b"body");
        let last = signed.len() - 1;
        signed[last] ^= 0x01;
        assert!(sk.verifying_key().verify_attached(&signed).is_err());
    }

    #[test]
    fn test_attached_truncated_fails() {
        let sk = SigningKey::generate();
        let signed = sk.sign_attached(b"body");
        assert!(sk.verifying_key().verify_attached(&signed[..32]).is_err());
    }

    #[test]
    fn test_verify_with_prefix() {
        let sk = SigningKey::generate();
        let vk = sk.verifying_key();
        let sk2 = SigningKey::generate();

        let good = sk.sign_attached(b"prefix:body");
        let bad_prefix = sk.sign_attached(b"not the prefix body");
        let bad_key = sk2.sign_attached(b"prefix:body");

        assert_eq!(
            verify_with_prefix(&vk, &good, b"prefix:").expect("verify"),
            b"body"
        );
        assert!(matches!(
            verify_with_prefix(&vk, &bad_prefix, b"prefix:"),
            Err(CryptoError::BadPrefix)
        ));
        assert!(matches!(
            verify_with_prefix(&vk, &bad_key, b"prefix:"),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn test_deterministic_from_seed() {
        let seed = [42u8; 32];
        let sk1 = SigningKey::from_bytes(&seed);
        let sk2 = SigningKey::from_bytes(&seed);
        assert_eq!(
            sk1.verifying_key().to_bytes(),
            sk2.verifying_key().to_bytes()
        );

        let sk3 = SigningKey::from_bytes(&[43u8; 32]);
        assert_ne!(
            sk1.verifying_key().to_bytes(),
            sk3.verifying_key().to_bytes()
        );
    }
}
