//! SQL schema definitions.
//!
//! Key material is stored as lowercase hex TEXT so that tracked-row
//! post-images serialize cleanly into notification payloads. JSON columns
//! hold the channel records exactly as they appear on the wire.

/// Complete schema for burrow database v1.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS version (
    version INTEGER NOT NULL
);

-- One row per pending pairing. Deleted when the peer's ACK arrives.
CREATE TABLE IF NOT EXISTS invitations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    petname TEXT NOT NULL,
    invite_key TEXT NOT NULL,
    invite_id TEXT NOT NULL UNIQUE,
    my_temp_privkey TEXT NOT NULL,
    my_signing_key TEXT NOT NULL,
    their_temp_pubkey TEXT,
    my_channel_record TEXT NOT NULL,
    my_private_channel_data TEXT NOT NULL,
    my_messages TEXT NOT NULL DEFAULT '',
    their_messages TEXT NOT NULL DEFAULT '',
    next_expected_message INTEGER NOT NULL,
    addressbook_id INTEGER
);

-- One row per established channel.
CREATE TABLE IF NOT EXISTS addressbook (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    petname TEXT NOT NULL,
    acked INTEGER NOT NULL DEFAULT 0,
    my_signing_key TEXT NOT NULL,
    their_verify_key TEXT NOT NULL,
    my_cid_key TEXT NOT NULL,
    next_cid_token TEXT,
    their_channel_record_json TEXT NOT NULL,
    my_old_channel_privkey TEXT NOT NULL,
    my_new_channel_privkey TEXT NOT NULL,
    they_used_new_channel_key INTEGER NOT NULL DEFAULT 0,
    next_outbound_seqnum INTEGER NOT NULL DEFAULT 1,
    highest_inbound_seqnum INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_invitations_invite_id ON invitations(invite_id);
"#;
