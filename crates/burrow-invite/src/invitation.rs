//! The per-batch invitation state machine.
//!
//! An [`Invitation`] has a brief lifetime: the manager creates one when the
//! rendezvous delivers a batch, it processes that batch in one pass, and it
//! is dropped once its pending writes commit and its outbound frames flush.
//! All durable state lives in the invitations row; the struct only carries
//! the columns the pass needs.
//!
//! The pass is idempotent under redelivery: already-seen frames are in
//! `my_messages` or `their_messages` and are filtered before dispatch, and
//! frames missing from the batch are re-broadcast to repair a crash between
//! commit and send.

use std::collections::BTreeSet;

use burrow_crypto::boxes;
use burrow_crypto::ed25519::{SigningKey, VerifyingKey};
use burrow_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use burrow_db::queries::invitations;
use burrow_db::ObservableDb;
use burrow_types::records::{ChannelRecord, PrivateChannelData};
use rand::RngCore;

use crate::util::{is_valid_wire_message, join_messages, split_messages};
use crate::{InviteError, Result};

const M1_PREFIX: &[u8] = b"i0:m1:";
const M2_PREFIX: &[u8] = b"i0:m2:";
const M2A_PREFIX: &[u8] = b"i0:m2a:";
const M3_PREFIX: &[u8] = b"i0:m3:";
const ACK_PREFIX: &[u8] = b"ACK-";
const DESTROY_PREFIX: &[u8] = b"i0:destroy:";

/// One invitation, loaded for a single processing pass.
pub struct Invitation {
    iid: i64,
    petname: String,
    invite_id: String,
    invite_key: SigningKey,
    their_temp_pubkey: Option<X25519PublicKey>,
    next_expected_message: u32,
    my_messages: BTreeSet<String>,
    their_messages: BTreeSet<String>,
    outbound: Vec<String>,
    unsubscribe_requested: bool,
}

impl Invitation {
    /// Load the invitation row `iid` for one pass.
    pub fn load(db: &ObservableDb, iid: i64) -> Result<Self> {
        let row = invitations::load(db.conn(), iid)?;
        let invite_key = SigningKey::from_bytes(&decode_key32(&row.invite_key)?);
        let their_temp_pubkey = match &row.their_temp_pubkey {
            Some(hex_key) => Some(X25519PublicKey::from_bytes(decode_key32(hex_key)?)),
            None => None,
        };
        Ok(Self {
            iid,
            petname: row.petname,
            invite_id: row.invite_id,
            invite_key,
            their_temp_pubkey,
            next_expected_message: row.next_expected_message,
            my_messages: split_messages(&row.my_messages),
            their_messages: split_messages(&row.their_messages),
            outbound: Vec::new(),
            unsubscribe_requested: false,
        })
    }

    /// The rendezvous channel this invitation listens on.
    pub fn invite_id(&self) -> &str {
        &self.invite_id
    }

    /// Frames queued for broadcast; the caller flushes them after commit.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Whether this pass finished the pairing and the channel subscription
    /// should be dropped.
    pub fn unsubscribe_requested(&self) -> bool {
        self.unsubscribe_requested
    }

    /// Send M1 right after the invitation row is created.
    pub fn send_first_message(&mut self, db: &mut ObservableDb) -> Result<()> {
        let my_temp = self.my_temp_privkey(db)?;
        let mut msg1 = M1_PREFIX.to_vec();
        msg1.extend_from_slice(&my_temp.public_key().to_bytes());
        self.send(&msg1, true);
        db.update(
            "UPDATE invitations SET my_messages = ?1 WHERE id = ?2",
            rusqlite::params![join_messages(&self.my_messages), self.iid],
            "invitations",
            self.iid,
        )?;
        Ok(())
    }

    /// Run one idempotent pass over a rendezvous batch.
    ///
    /// The caller commits on success (all effects in one transaction) and
    /// rolls back on error; [`InviteError::CorruptChannel`] and
    /// [`InviteError::BindingFailure`] additionally mean "abandon the
    /// channel".
    pub fn process_messages(
        &mut self,
        db: &mut ObservableDb,
        messages: &BTreeSet<String>,
    ) -> Result<()> {
        // Re-broadcast anything the rendezvous has not seen. This covers a
        // crash after commit but before delivery.
        let resends: Vec<String> = self.my_messages.difference(messages).cloned().collect();
        for msg in resends {
            tracing::debug!(invite_id = %self.invite_id, "resending frame");
            self.outbound.push(msg);
        }

        let new_messages: BTreeSet<String> = messages
            .iter()
            .filter(|m| !self.my_messages.contains(*m) && !self.their_messages.contains(*m))
            .cloned()
            .collect();

        // Check signatures and extract bodies. An invalid frame kills the
        // whole channel and the invitation with it.
        let mut bodies: BTreeSet<Vec<u8>> = BTreeSet::new();
        for msg in &new_messages {
            if !is_valid_wire_message(msg) {
                return Err(InviteError::CorruptChannel);
            }
            let signed = hex::decode(&msg["r0:".len()..])
                .map_err(|_| InviteError::CorruptChannel)?;
            let body = self
                .invite_key
                .verifying_key()
                .verify_attached(&signed)
                .map_err(|_| InviteError::CorruptChannel)?;
            bodies.insert(body);
        }

        // Handlers advance next_expected_message, so one pass can walk
        // through several stages (the peer's M1 and M2 often arrive in the
        // same batch). Each stage consumes at most one matching body.
        if self.next_expected_message == 1 {
            if let Some(body) = body_with_prefix(&bodies, M1_PREFIX) {
                self.process_m1(db, &body)?;
            }
        }
        if self.next_expected_message == 2 {
            if let Some(body) = body_with_prefix(&bodies, M2_PREFIX) {
                self.process_m2(db, &body)?;
            }
        }
        if self.next_expected_message == 3 {
            if let Some(body) = body_with_prefix(&bodies, M3_PREFIX) {
                self.process_m3(db, &body)?;
            }
        }

        let their_updated: BTreeSet<String> = self
            .their_messages
            .union(&new_messages)
            .cloned()
            .collect();
        // A no-op when M3 just deleted the row.
        db.update(
            "UPDATE invitations SET
               my_messages = ?1, their_messages = ?2, next_expected_message = ?3
             WHERE id = ?4",
            rusqlite::params![
                join_messages(&self.my_messages),
                join_messages(&their_updated),
                self.next_expected_message,
                self.iid,
            ],
            "invitations",
            self.iid,
        )?;
        Ok(())
    }

    /// Sign and queue a frame. Persistent frames join `my_messages` so the
    /// resend rule covers them; the destroy frame is fire-and-forget.
    fn send(&mut self, msg: &[u8], persist: bool) {
        let signed = format!("r0:{}", hex::encode(self.invite_key.sign_attached(msg)));
        debug_assert!(is_valid_wire_message(&signed));
        if persist {
            self.my_messages.insert(signed.clone());
        }
        self.outbound.push(signed);
    }

    /// Peer's M1: record their temp key, answer with our signed M2.
    fn process_m1(&mut self, db: &mut ObservableDb, body: &[u8]) -> Result<()> {
        tracing::debug!(petname = %self.petname, "processing M1");
        let their_temp_bytes: [u8; 32] = body
            .try_into()
            .map_err(|_| InviteError::CorruptChannel)?;
        let their_temp = X25519PublicKey::from_bytes(their_temp_bytes);
        self.their_temp_pubkey = Some(their_temp.clone());
        db.update(
            "UPDATE invitations SET their_temp_pubkey = ?1 WHERE id = ?2",
            rusqlite::params![hex::encode(their_temp_bytes), self.iid],
            "invitations",
            self.iid,
        )?;

        let my_temp = self.my_temp_privkey(db)?;
        let my_sign = self.my_signing_key(db)?;
        let my_channel_record = self.my_channel_record_json(db)?;

        // The signature covers both temp keys, binding this channel record
        // to exactly this exchange.
        let mut signed_body = Vec::new();
        signed_body.extend_from_slice(&their_temp.to_bytes());
        signed_body.extend_from_slice(&my_temp.public_key().to_bytes());
        signed_body.extend_from_slice(my_channel_record.as_bytes());

        let mut inner = M2A_PREFIX.to_vec();
        inner.extend_from_slice(&my_sign.verifying_key().to_bytes());
        inner.extend_from_slice(&my_sign.sign_attached(&signed_body));

        let sealed = boxes::box_seal(&their_temp, &my_temp, &inner)?;
        let mut msg2 = M2_PREFIX.to_vec();
        msg2.extend_from_slice(&sealed);
        self.send(&msg2, true);
        self.next_expected_message = 2;
        Ok(())
    }

    /// Peer's M2: open, verify, cross-check the bindings, and create the
    /// address-book entry.
    fn process_m2(&mut self, db: &mut ObservableDb, body: &[u8]) -> Result<()> {
        tracing::debug!(petname = %self.petname, "processing M2");
        let their_temp = self
            .their_temp_pubkey
            .clone()
            .ok_or(InviteError::CorruptChannel)?;
        let my_temp = self.my_temp_privkey(db)?;

        let opened = boxes::box_open(&their_temp, &my_temp, body)
            .map_err(|_| InviteError::CorruptChannel)?;
        let signed_part = opened
            .strip_prefix(M2A_PREFIX)
            .ok_or(InviteError::CorruptChannel)?;
        if signed_part.len() < 32 {
            return Err(InviteError::CorruptChannel);
        }
        let verfkey_bytes: [u8; 32] = signed_part[..32]
            .try_into()
            .map_err(|_| InviteError::CorruptChannel)?;
        let their_verfkey = VerifyingKey::from_bytes(&verfkey_bytes)
            .map_err(|_| InviteError::CorruptChannel)?;
        let verified = their_verfkey
            .verify_attached(&signed_part[32..])
            .map_err(|_| InviteError::CorruptChannel)?;
        if verified.len() < 64 {
            return Err(InviteError::CorruptChannel);
        }

        // Binding checks: the signed body must name my actual temp key and
        // the temp key I first saw from the peer. Either mismatch means
        // someone is splicing exchanges together.
        if verified[..32] != my_temp.public_key().to_bytes() {
            return Err(InviteError::BindingFailure);
        }
        if verified[32..64] != their_temp.to_bytes() {
            return Err(InviteError::BindingFailure);
        }

        let their_record_json = std::str::from_utf8(&verified[64..])
            .map_err(|_| InviteError::CorruptChannel)?;
        let them = ChannelRecord::from_json(their_record_json)
            .map_err(|_| InviteError::CorruptChannel)?;

        let row = invitations::load(db.conn(), self.iid)?;
        let me = PrivateChannelData::from_json(&row.my_private_channel_data)?;

        let addressbook_id = db.insert(
            "INSERT INTO addressbook
             (petname, acked,
              next_outbound_seqnum, my_signing_key,
              their_channel_record_json,
              my_cid_key, next_cid_token,
              highest_inbound_seqnum,
              my_old_channel_privkey, my_new_channel_privkey,
              they_used_new_channel_key, their_verify_key)
             VALUES (?1, 0, 1, ?2, ?3, ?4, NULL, 0, ?5, ?6, 0, ?7)",
            rusqlite::params![
                self.petname,
                hex::encode(me.my_signing_key),
                them.to_json()?,
                hex::encode(me.my_cid_key),
                hex::encode(me.my_old_channel_privkey),
                hex::encode(me.my_new_channel_privkey),
                hex::encode(verfkey_bytes),
            ],
            "addressbook",
        )?;
        db.update(
            "UPDATE invitations SET addressbook_id = ?1 WHERE id = ?2",
            rusqlite::params![addressbook_id, self.iid],
            "invitations",
            self.iid,
        )?;

        let mut msg3 = M3_PREFIX.to_vec();
        msg3.extend_from_slice(ACK_PREFIX);
        msg3.extend_from_slice(&random_nonce16());
        self.send(&msg3, true);
        self.next_expected_message = 3;
        Ok(())
    }

    /// Peer's ACK: mark the entry acked, drop the invitation, and sign off
    /// on the rendezvous channel.
    fn process_m3(&mut self, db: &mut ObservableDb, body: &[u8]) -> Result<()> {
        tracing::debug!(petname = %self.petname, "processing M3");
        if !body.starts_with(ACK_PREFIX) {
            return Err(InviteError::CorruptChannel);
        }
        let row = invitations::load(db.conn(), self.iid)?;
        let addressbook_id = row.addressbook_id.ok_or(InviteError::CorruptChannel)?;

        db.update(
            "UPDATE addressbook SET acked = 1 WHERE id = ?1",
            [addressbook_id],
            "addressbook",
            addressbook_id,
        )?;
        db.delete(
            "DELETE FROM invitations WHERE id = ?1",
            [self.iid],
            "invitations",
            self.iid,
        )?;

        // We no longer care about the channel; tell the rendezvous so.
        let mut msg4 = DESTROY_PREFIX.to_vec();
        msg4.extend_from_slice(&random_nonce16());
        self.send(&msg4, false);
        self.unsubscribe_requested = true;
        Ok(())
    }

    fn my_temp_privkey(&self, db: &ObservableDb) -> Result<X25519StaticSecret> {
        let row = invitations::load(db.conn(), self.iid)?;
        Ok(X25519StaticSecret::from_bytes(decode_key32(
            &row.my_temp_privkey,
        )?))
    }

    fn my_signing_key(&self, db: &ObservableDb) -> Result<SigningKey> {
        let row = invitations::load(db.conn(), self.iid)?;
        Ok(SigningKey::from_bytes(&decode_key32(&row.my_signing_key)?))
    }

    fn my_channel_record_json(&self, db: &ObservableDb) -> Result<String> {
        Ok(invitations::load(db.conn(), self.iid)?.my_channel_record)
    }
}

/// Pull the first body carrying `prefix` out of a batch, stripped. At most
/// one per stage per pass; the stage loop re-enters by state.
fn body_with_prefix(bodies: &BTreeSet<Vec<u8>>, prefix: &[u8]) -> Option<Vec<u8>> {
    bodies
        .iter()
        .find(|body| body.starts_with(prefix))
        .map(|body| body[prefix.len()..].to_vec())
}

fn random_nonce16() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn decode_key32(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key).map_err(|_| InviteError::CorruptChannel)?;
    bytes
        .try_into()
        .map_err(|_| InviteError::CorruptChannel)
}
