//! Channel and transport records.
//!
//! The public [`ChannelRecord`] is what a peer publishes about itself during
//! pairing: it rides inside the signed M2 body as UTF-8 JSON, and the copy a
//! node receives is persisted verbatim in its address book. Fixed-size key
//! fields are hex strings on the wire.
//!
//! [`PrivateChannelData`] is the local-only counterpart, prepared at
//! invitation time and moved into the address-book row once pairing
//! completes. It never transits the wire.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// An error produced while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record serialization error: {0}")]
    Serialization(String),
}

/// One way to reach a peer's mailbox, as published to that peer's contacts.
///
/// Senders wrap each outgoing message for the mailbox's encryption key and
/// attach a fresh rerandomization of `stid`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRecord {
    /// Transport flavor, e.g. `"local"` or `"http"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// X25519 public key of the mailbox server.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub transport_pubkey: [u8; 32],
    /// The sender-side rerandomizable mailbox token (96 bytes).
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(rename = "STID")]
    pub stid: Vec<u8>,
    /// Retrieval endpoint, when the transport has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The public half of a channel, published to the peer during pairing.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// X25519 public key messages to me are encrypted to.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub channel_pubkey: [u8; 32],
    /// Symmetric key the peer uses to address me (`CIDToken` / `CIDBox`).
    #[serde_as(as = "serde_with::hex::Hex")]
    #[serde(rename = "CID_key")]
    pub cid_key: [u8; 32],
    /// Mailboxes that deliver to me.
    pub transports: Vec<TransportRecord>,
}

/// The private half of a channel, kept local for the invitation's lifetime.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateChannelData {
    /// Seed of my long-term Ed25519 signing key for this channel.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub my_signing_key: [u8; 32],
    /// The CID key I chose and revealed in my channel record.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub my_cid_key: [u8; 32],
    /// Current channel decryption key.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub my_old_channel_privkey: [u8; 32],
    /// Next channel decryption key (equal to old until a rotation).
    #[serde_as(as = "serde_with::hex::Hex")]
    pub my_new_channel_privkey: [u8; 32],
    /// Local ids of the transports published in my channel record.
    pub transport_ids: Vec<i64>,
}

impl ChannelRecord {
    /// Encode as the canonical UTF-8 JSON carried inside M2.
    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(|e| RecordError::Serialization(e.to_string()))
    }

    /// Decode from the JSON form.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        serde_json::from_str(json).map_err(|e| RecordError::Serialization(e.to_string()))
    }
}

impl PrivateChannelData {
    /// Encode for storage in the invitations table.
    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(|e| RecordError::Serialization(e.to_string()))
    }

    /// Decode from the stored form.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        serde_json::from_str(json).map_err(|e| RecordError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ChannelRecord {
        ChannelRecord {
            channel_pubkey: [0x11u8; 32],
            cid_key: [0x22u8; 32],
            transports: vec![TransportRecord {
                kind: "local".to_string(),
                transport_pubkey: [0x33u8; 32],
                stid: vec![0x44u8; 96],
                url: None,
            }],
        }
    }

    #[test]
    fn test_channel_record_roundtrip() {
        let record = sample_record();
        let json = record.to_json().expect("encode");
        let parsed = ChannelRecord::from_json(&json).expect("decode");
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_wire_field_names() {
        let json = sample_record().to_json().expect("encode");
        assert!(json.contains("\"CID_key\""));
        assert!(json.contains("\"STID\""));
        assert!(json.contains("\"type\":\"local\""));
        // Keys are hex strings on the wire.
        assert!(json.contains(&"11".repeat(32)));
    }

    #[test]
    fn test_private_data_roundtrip() {
        let data = PrivateChannelData {
            my_signing_key: [0x01u8; 32],
            my_cid_key: [0x02u8; 32],
            my_old_channel_privkey: [0x03u8; 32],
            my_new_channel_privkey: [0x03u8; 32],
            transport_ids: vec![0, 1],
        };
        let json = data.to_json().expect("encode");
        let parsed = PrivateChannelData::from_json(&json).expect("decode");
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_bad_json_rejected() {
        assert!(ChannelRecord::from_json("{\"nope\":1}").is_err());
    }
}
