//! # burrow-channel
//!
//! The channel messaging layer: nested envelopes carrying an application
//! payload between two address-book peers.
//!
//! ```text
//! msgC = "c0:" ‖ CIDToken(32) ‖ netstring(CIDBox) ‖ msgD
//! msgD = pub₂(32) ‖ box(to = channel_current, from = pub₂, msgE)
//! msgE = seqnum(8, BE) ‖ netstring(sign("ce0:" ‖ pub₂)) ‖ utf8_json(payload)
//! ```
//!
//! `pub₂` is a fresh ephemeral key per message (forward secrecy); the signed
//! `"ce0:"` block binds the peer's long-term identity to that ephemeral
//! without producing a transferable proof; `CIDToken`/`CIDBox` let the
//! recipient identify the channel without telling the transport anything.
//!
//! [`outbound`] builds envelopes, [`inbound`] runs the receive pipeline.

pub mod cid;
pub mod inbound;
pub mod outbound;

use burrow_types::netstring::NetstringError;

/// The `msgC` framing prefix.
pub const MSG_C_PREFIX: &[u8] = b"c0:";

/// The prefix inside the signed ephemeral-key binding block of `msgE`.
pub const MSG_E_AUTH_PREFIX: &[u8] = b"ce0:";

/// Error types for channel operations.
///
/// Everything on the inbound path is non-fatal to the process: [`Replay`] is
/// logged, the rest are dropped silently to preserve unlinkability.
///
/// [`Replay`]: ChannelError::Replay
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Inbound seqnum is not newer than the highest accepted one.
    #[error("message seqnum is not newer than the highest accepted")]
    Replay,

    /// No candidate channel key decrypts the message.
    #[error("no channel key matches this message")]
    UnknownChannel,

    /// The inner signature does not bind to the ephemeral key.
    #[error("sender signature does not bind to the message key")]
    WrongVerfkey,

    /// Framing or cross-validation failed; dropped silently.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Store failure (fatal to the caller).
    #[error(transparent)]
    Db(#[from] burrow_db::DbError),

    /// Cryptographic failure; dropped silently.
    #[error(transparent)]
    Crypto(#[from] burrow_crypto::CryptoError),

    /// Transport wrapping failure on the outbound path.
    #[error(transparent)]
    Transport(#[from] burrow_transport::TransportError),
}

impl From<NetstringError> for ChannelError {
    fn from(e: NetstringError) -> Self {
        ChannelError::Protocol(e.to_string())
    }
}

impl From<burrow_types::records::RecordError> for ChannelError {
    fn from(e: burrow_types::records::RecordError) -> Self {
        ChannelError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Decode a hex-encoded 32-byte key column.
pub(crate) fn decode_key32(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| ChannelError::Protocol(format!("bad hex key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ChannelError::Protocol("key is not 32 bytes".into()))
}
