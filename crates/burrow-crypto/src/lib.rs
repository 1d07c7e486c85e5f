//! # burrow-crypto
//!
//! Cryptographic primitives for the burrow protocol.
//!
//! Every other crate in the workspace consumes these operations as black
//! boxes; no algorithm negotiation is permitted and the suite is fixed.
//!
//! ## Modules
//!
//! - [`ed25519`] — Ed25519 signing, attached signatures, prefix verification
//! - [`x25519`] — X25519 key agreement (RFC 7748)
//! - [`boxes`] — public-key "box" and symmetric "secretbox" sealing
//!   (XChaCha20-Poly1305, 24-byte nonces)
//! - [`hkdf`] — HKDF-SHA256 (RFC 5869)
//! - [`sha256`] — SHA-256 hashing
//! - [`stretch`] — Argon2id stretching of invitation codes

pub mod boxes;
pub mod ed25519;
pub mod hkdf;
pub mod sha256;
pub mod stretch;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// A signed message did not carry the required plaintext prefix.
    #[error("signed message lacks expected prefix")]
    BadPrefix,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Argon2id stretching failed.
    #[error("argon2id error: {0}")]
    Argon2(String),

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
