//! The invitation manager.
//!
//! Owns the rendezvous connections and drives every pending invitation:
//! creating them, re-subscribing them at startup, and feeding inbound
//! batches through the state machine. Outbound frames flush only after the
//! batch's transaction commits, so a crash in between is repaired by the
//! resend rule rather than by luck.

use std::collections::{BTreeMap, BTreeSet};

use burrow_crypto::ed25519::SigningKey;
use burrow_crypto::stretch::stretch_invite_code;
use burrow_crypto::x25519::X25519StaticSecret;
use burrow_db::queries::invitations;
use burrow_db::SharedDb;
use burrow_types::records::{ChannelRecord, PrivateChannelData, TransportRecord};
use rand::RngCore;

use crate::invitation::Invitation;
use crate::rendezvous::Rendezvous;
use crate::{InviteError, Result};

/// Manages all pending invitations and the rendezvous connections that
/// carry them.
pub struct InvitationManager {
    db: SharedDb,
    rendezvous: Vec<Box<dyn Rendezvous>>,
}

impl InvitationManager {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            rendezvous: Vec::new(),
        }
    }

    /// Attach a rendezvous connection. All sends and subscriptions fan out
    /// to every attached connection.
    pub fn add_rendezvous(&mut self, rs: Box<dyn Rendezvous>) {
        self.rendezvous.push(rs);
    }

    /// Re-subscribe every persisted invitation, typically at startup. The
    /// next poll redelivers the channel sets, which triggers resends or
    /// reactions to whatever arrived while we were down.
    pub fn ready_pending_invitations(&mut self) -> Result<()> {
        let invite_ids = {
            let db = self.db.borrow();
            invitations::all_invite_ids(db.conn())?
        };
        for invite_id in invite_ids {
            self.subscribe_all(&invite_id);
        }
        Ok(())
    }

    /// Start a new pairing: derive the channel from `code`, persist the
    /// invitation, subscribe, and send M1.
    ///
    /// Fails with [`InviteError::DuplicateCode`] when an invitation for the
    /// same code is already pending.
    pub fn invite(
        &mut self,
        petname: &str,
        code: &[u8],
        transports: &BTreeMap<i64, TransportRecord>,
    ) -> Result<i64> {
        let stretched = stretch_invite_code(code)?;
        let invite_key = SigningKey::from_bytes(&stretched);
        let invite_id = hex::encode(invite_key.verifying_key().to_bytes());

        {
            let db = self.db.borrow();
            if invitations::invite_id_in_use(db.conn(), &invite_id)? {
                return Err(InviteError::DuplicateCode);
            }
        }

        let my_signing_key = SigningKey::generate();
        let my_temp_privkey = X25519StaticSecret::random();
        let channel_key = X25519StaticSecret::random();
        let mut cid_key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut cid_key);

        let public_record = ChannelRecord {
            channel_pubkey: channel_key.public_key().to_bytes(),
            cid_key,
            transports: transports.values().cloned().collect(),
        };
        let private_data = PrivateChannelData {
            my_signing_key: my_signing_key.to_bytes(),
            my_cid_key: cid_key,
            my_old_channel_privkey: channel_key.to_bytes(),
            my_new_channel_privkey: channel_key.to_bytes(),
            transport_ids: transports.keys().copied().collect(),
        };

        let (iid, outbound) = {
            let mut db = self.db.borrow_mut();
            let iid = db.insert(
                "INSERT INTO invitations
                 (code, petname, invite_key, invite_id,
                  my_temp_privkey, my_signing_key,
                  my_channel_record, my_private_channel_data,
                  my_messages, their_messages, next_expected_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '', '', 1)",
                rusqlite::params![
                    hex::encode(code),
                    petname,
                    hex::encode(stretched),
                    invite_id,
                    hex::encode(my_temp_privkey.to_bytes()),
                    hex::encode(my_signing_key.to_bytes()),
                    public_record.to_json()?,
                    private_data.to_json()?,
                ],
                "invitations",
            )?;
            let mut invitation = Invitation::load(&db, iid)?;
            invitation.send_first_message(&mut db)?;
            db.commit()?;
            (iid, invitation.take_outbound())
        };

        self.subscribe_all(&invite_id);
        for msg in outbound {
            self.send_to_all(&invite_id, &msg);
        }
        Ok(iid)
    }

    /// Drain every rendezvous connection and process the delivered batches.
    pub fn poll(&mut self) -> Result<()> {
        let mut batches = Vec::new();
        for rs in &mut self.rendezvous {
            batches.append(&mut rs.poll());
        }
        for (invite_id, messages) in batches {
            match self.messages_received(&invite_id, &messages) {
                Ok(()) => {}
                Err(InviteError::UnknownInvite(_)) => {
                    // The invitation completed (or was abandoned) under us;
                    // stop listening.
                    tracing::debug!(%invite_id, "batch for finished invitation");
                    self.unsubscribe_all(&invite_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Process one rendezvous batch for one invitation.
    ///
    /// All effects of the batch — state transitions, address-book inserts,
    /// message-set updates — commit in a single transaction before any
    /// outbound frame leaves. A corrupt frame or failed binding rolls the
    /// whole batch back and abandons the channel.
    pub fn messages_received(
        &mut self,
        invite_id: &str,
        messages: &BTreeSet<String>,
    ) -> Result<()> {
        let processed = {
            let mut db = self.db.borrow_mut();
            let Some(iid) = invitations::find_by_invite_id(db.conn(), invite_id)? else {
                return Err(InviteError::UnknownInvite(invite_id.to_string()));
            };
            let mut invitation = Invitation::load(&db, iid)?;
            match invitation.process_messages(&mut db, messages) {
                Ok(()) => {
                    db.commit()?;
                    Some((
                        invitation.take_outbound(),
                        invitation.unsubscribe_requested(),
                    ))
                }
                Err(e) if matches!(
                    e,
                    InviteError::CorruptChannel | InviteError::BindingFailure
                ) =>
                {
                    tracing::warn!(invite_id, error = %e, "abandoning invitation");
                    db.rollback()?;
                    None
                }
                Err(e) => {
                    db.rollback()?;
                    return Err(e);
                }
            }
        };

        match processed {
            Some((outbound, unsubscribe)) => {
                for msg in outbound {
                    self.send_to_all(invite_id, &msg);
                }
                if unsubscribe {
                    self.unsubscribe_all(invite_id);
                }
            }
            // TODO: mark the invitation row failed instead of leaving it
            // stranded for manual cleanup.
            None => self.unsubscribe_all(invite_id),
        }
        Ok(())
    }

    fn subscribe_all(&mut self, invite_id: &str) {
        for rs in &mut self.rendezvous {
            rs.subscribe(invite_id);
        }
    }

    fn unsubscribe_all(&mut self, invite_id: &str) {
        for rs in &mut self.rendezvous {
            rs.unsubscribe(invite_id);
        }
    }

    fn send_to_all(&mut self, invite_id: &str, msg: &str) {
        for rs in &mut self.rendezvous {
            rs.send(invite_id, msg);
        }
    }
}
