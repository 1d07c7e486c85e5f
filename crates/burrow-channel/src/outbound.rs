//! The channel sender.
//!
//! [`OutboundChannel`] builds `msgC` for one address-book peer. Each send
//! burns one seqnum (committed before any ciphertext leaves the store, so a
//! crash can skip a number but never reuse one) and one fresh ephemeral
//! keypair.

use burrow_crypto::ed25519::SigningKey;
use burrow_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use burrow_crypto::{boxes, sha256};
use burrow_db::queries::addressbook;
use burrow_db::ObservableDb;
use burrow_types::netstring::netstring;
use burrow_types::records::ChannelRecord;

use crate::cid::{build_cid_token, seal_cid_box};
use crate::{decode_key32, ChannelError, Result, MSG_C_PREFIX, MSG_E_AUTH_PREFIX};

/// Sender for one established channel (one address-book row).
pub struct OutboundChannel {
    cid: i64,
}

impl OutboundChannel {
    /// Address the peer at address-book row `cid`.
    pub fn new(cid: i64) -> Self {
        Self { cid }
    }

    /// Build a `msgC` carrying a JSON payload.
    ///
    /// Increments and commits `next_outbound_seqnum` first; the envelope is
    /// constructed against the seqnum just consumed.
    pub fn create_msg_c(
        &self,
        db: &mut ObservableDb,
        payload: &serde_json::Value,
    ) -> Result<Vec<u8>> {
        let entry = addressbook::get(db.conn(), self.cid)?;
        let seqnum = entry.next_outbound_seqnum;
        db.update(
            "UPDATE addressbook SET next_outbound_seqnum = ?1 WHERE id = ?2",
            [(seqnum + 1) as i64, self.cid],
            "addressbook",
            self.cid,
        )?;
        db.commit()?;

        let seqnum_bytes = seqnum.to_be_bytes();
        let my_signkey = SigningKey::from_bytes(&decode_key32(&entry.my_signing_key)?);
        let them = ChannelRecord::from_json(&entry.their_channel_record_json)?;

        let privkey2 = X25519StaticSecret::random();
        let pubkey2 = privkey2.public_key().to_bytes();

        // msgE: seqnum ‖ netstring(signed ephemeral binding) ‖ payload JSON
        let mut authenticator = Vec::with_capacity(MSG_E_AUTH_PREFIX.len() + 32);
        authenticator.extend_from_slice(MSG_E_AUTH_PREFIX);
        authenticator.extend_from_slice(&pubkey2);
        let payload_bytes = serde_json::to_vec(payload)
            .map_err(|e| ChannelError::Protocol(format!("payload encoding: {e}")))?;
        let mut msg_e = Vec::new();
        msg_e.extend_from_slice(&seqnum_bytes);
        msg_e.extend_from_slice(&netstring(&my_signkey.sign_attached(&authenticator)));
        msg_e.extend_from_slice(&payload_bytes);

        // msgD: ephemeral pubkey ‖ box to the peer's current channel key
        let channel_pubkey = X25519PublicKey::from_bytes(them.channel_pubkey);
        let mut msg_d = Vec::with_capacity(32 + msg_e.len() + 40);
        msg_d.extend_from_slice(&pubkey2);
        msg_d.extend_from_slice(&boxes::box_seal(&channel_pubkey, &privkey2, &msg_e)?);

        let h_msg_d = sha256::hash(&msg_d);
        let cid_token = build_cid_token(&them.cid_key, seqnum);
        let cid_box = seal_cid_box(&them.cid_key, seqnum, &h_msg_d, &them.channel_pubkey)?;

        let mut msg_c = Vec::new();
        msg_c.extend_from_slice(MSG_C_PREFIX);
        msg_c.extend_from_slice(&cid_token);
        msg_c.extend_from_slice(&netstring(&cid_box));
        msg_c.extend_from_slice(&msg_d);
        Ok(msg_c)
    }

    /// Build a `msgC` and wrap it for every transport the peer declared.
    ///
    /// Returns one `msgA` per transport; delivering them (and retrying) is
    /// the retriever's job. Send counts as complete when every wrap
    /// succeeded.
    pub fn send(
        &self,
        db: &mut ObservableDb,
        payload: &serde_json::Value,
    ) -> Result<Vec<Vec<u8>>> {
        let msg_c = self.create_msg_c(db, payload)?;
        let entry = addressbook::get(db.conn(), self.cid)?;
        let them = ChannelRecord::from_json(&entry.their_channel_record_json)?;
        them.transports
            .iter()
            .map(|trec| Ok(burrow_transport::create_msg_a(trec, &msg_c)?))
            .collect()
    }
}
