//! # burrow-transport
//!
//! The outermost delivery envelope. A sender never addresses a peer
//! directly; it wraps the channel message (`msgC`) for one of the peer's
//! declared mailboxes:
//!
//! ```text
//! msgA = "a0:" ‖ pub₁(32) ‖ box(to = transport_pubkey, from = priv₁, msgB)
//! msgB = netstring(MSTID) ‖ msgC
//! ```
//!
//! `MSTID` is a fresh rerandomization of the peer's mailbox token, so two
//! deliveries to the same recipient are unlinkable to the relay path.
//! `priv₁` is generated per message and discarded.
//!
//! The receiving side lives in [`mailbox`].

pub mod mailbox;

use burrow_crypto::boxes;
use burrow_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use burrow_types::netstring::{netstring, split_netstring_and_trailer, NetstringError};
use burrow_types::records::TransportRecord;

/// The `msgA` framing prefix.
pub const MSG_A_PREFIX: &[u8] = b"a0:";

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Envelope framing failed.
    #[error("malformed transport message: {0}")]
    Protocol(String),

    /// Cryptographic failure while sealing or opening an envelope.
    #[error("transport crypto error: {0}")]
    Crypto(#[from] burrow_crypto::CryptoError),

    /// The mailbox token could not be handled.
    #[error("mailbox token error: {0}")]
    Token(#[from] burrow_rrid::RridError),
}

impl From<NetstringError> for TransportError {
    fn from(e: NetstringError) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Wrap a `msgC` into a `msgA` for one of the peer's declared transports.
///
/// Rerandomizes the transport's mailbox token so this delivery cannot be
/// linked to any other.
pub fn create_msg_a(trec: &TransportRecord, msg_c: &[u8]) -> Result<Vec<u8>> {
    let mstid = burrow_rrid::randomize(&trec.stid)?;

    let mut msg_b = netstring(&mstid);
    msg_b.extend_from_slice(msg_c);

    let privkey1 = X25519StaticSecret::random();
    let transport_pubkey = X25519PublicKey::from_bytes(trec.transport_pubkey);
    let sealed = boxes::box_seal(&transport_pubkey, &privkey1, &msg_b)?;

    let mut msg_a = Vec::with_capacity(MSG_A_PREFIX.len() + 32 + sealed.len());
    msg_a.extend_from_slice(MSG_A_PREFIX);
    msg_a.extend_from_slice(&privkey1.public_key().to_bytes());
    msg_a.extend_from_slice(&sealed);
    Ok(msg_a)
}

/// Split a `msgA` into the sender's ephemeral public key and the sealed box.
pub fn parse_msg_a(msg_a: &[u8]) -> Result<([u8; 32], Vec<u8>)> {
    let body = msg_a
        .strip_prefix(MSG_A_PREFIX)
        .ok_or_else(|| TransportError::Protocol("msgA prefix missing".into()))?;
    if body.len() < 32 {
        return Err(TransportError::Protocol("msgA too short".into()));
    }
    let pubkey1: [u8; 32] = body[..32]
        .try_into()
        .map_err(|_| TransportError::Protocol("msgA pubkey malformed".into()))?;
    Ok((pubkey1, body[32..].to_vec()))
}

/// Split a decrypted `msgB` into the mailbox token and the inner `msgC`.
pub fn parse_msg_b(msg_b: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    Ok(split_netstring_and_trailer(msg_b)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_record() -> (X25519StaticSecret, [u8; 32], TransportRecord) {
        let transport_key = X25519StaticSecret::random();
        let (tokenid, _privkey, token0) = burrow_rrid::create();
        let record = TransportRecord {
            kind: "local".to_string(),
            transport_pubkey: transport_key.public_key().to_bytes(),
            stid: token0.to_vec(),
            url: None,
        };
        (transport_key, tokenid, record)
    }

    #[test]
    fn test_msg_a_roundtrip() {
        let (transport_key, _tokenid, record) = fake_record();
        let msg_a = create_msg_a(&record, b"inner msgC").expect("wrap");
        assert!(msg_a.starts_with(MSG_A_PREFIX));

        let (pubkey1, sealed) = parse_msg_a(&msg_a).expect("parse msgA");
        let msg_b = boxes::box_open(
            &X25519PublicKey::from_bytes(pubkey1),
            &transport_key,
            &sealed,
        )
        .expect("open");
        let (mstid, msg_c) = parse_msg_b(&msg_b).expect("parse msgB");
        assert_eq!(msg_c, b"inner msgC");
        assert_eq!(mstid.len(), burrow_rrid::TOKEN_LENGTH);
        // The wrapped token is a fresh rerandomization, not the published one.
        assert_ne!(mstid, record.stid);
    }

    #[test]
    fn test_each_wrap_is_unlinkable() {
        let (_transport_key, _tokenid, record) = fake_record();
        let a = create_msg_a(&record, b"m").expect("wrap");
        let b = create_msg_a(&record, b"m").expect("wrap");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_prefix() {
        assert!(parse_msg_a(b"x0:junk").is_err());
        assert!(parse_msg_a(b"a0:short").is_err());
    }
}
