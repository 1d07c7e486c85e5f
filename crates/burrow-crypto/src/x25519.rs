//! X25519 key agreement (RFC 7748).
//!
//! Used for the invitation temp keys, the per-channel encryption keys, the
//! per-message ephemeral keys, and the mailbox transport keys. All of these
//! are held as [`X25519StaticSecret`] because even the "ephemeral" ones must
//! round-trip through the store as raw bytes.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// An X25519 secret key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct X25519StaticSecret {
    inner: StaticSecret,
}

/// An X25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey {
    bytes: [u8; 32],
}

/// An X25519 shared secret.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn random() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    /// Get the raw bytes of this secret.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Compute the corresponding public key.
    pub fn public_key(&self) -> X25519PublicKey {
        let pk = PublicKey::from(&self.inner);
        X25519PublicKey {
            bytes: pk.to_bytes(),
        }
    }

    /// Perform Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        let pk = PublicKey::from(their_public.bytes);
        let shared = self.inner.diffie_hellman(&pk);
        SharedSecret {
            bytes: *shared.as_bytes(),
        }
    }
}

impl X25519PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl SharedSecret {
    /// Get the raw bytes of the shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X25519StaticSecret")
            .field("public", &self.public_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diffie_hellman_agreement() {
        let alice = X25519StaticSecret::random();
        let bob = X25519StaticSecret::random();

        let alice_shared = alice.diffie_hellman(&bob.public_key());
        let bob_shared = bob.diffie_hellman(&alice.public_key());

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let secret = X25519StaticSecret::random();
        let restored = X25519StaticSecret::from_bytes(secret.to_bytes());
        assert_eq!(
            secret.public_key().to_bytes(),
            restored.public_key().to_bytes()
        );
    }

    #[test]
    fn test_distinct_keys() {
        let a = X25519StaticSecret::random();
        let b = X25519StaticSecret::random();
        assert_ne!(a.public_key().to_bytes(), b.public_key().to_bytes());
    }
}
