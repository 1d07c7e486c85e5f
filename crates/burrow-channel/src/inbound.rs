//! The channel receiver.
//!
//! Receiving a `msgC` works inwards, gathering hints about which channel to
//! use, then validates outwards again:
//!
//! 1. parse the framing,
//! 2. resolve a channel hint (token index when available, otherwise a
//!    trial-decryption scan of every channel's CID key),
//! 3. build the candidate decryption keylist (old + new key per channel),
//! 4. trial-decrypt `msgD`,
//! 5. verify `msgE` (seqnum freshness, signed ephemeral binding, payload),
//! 6. cross-validate everything the `CIDBox` claimed,
//! 7. commit the new high-water mark and emit `(addressbook_id, payload)`.
//!
//! Any failure along the way drops the message: silently for unknown or
//! tampered traffic, with a log line for replays.

use burrow_crypto::ed25519::{verify_with_prefix, VerifyingKey};
use burrow_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use burrow_crypto::{boxes, sha256, CryptoError};
use burrow_db::queries::addressbook;
use burrow_db::ObservableDb;
use burrow_types::netstring::split_netstring_and_trailer;
use rusqlite::Connection;

use crate::cid::{build_cid_token, open_cid_box, CID_TOKEN_LENGTH};
use crate::{decode_key32, ChannelError, Result, MSG_C_PREFIX, MSG_E_AUTH_PREFIX};

/// Which of the dual channel keys decrypted a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAge {
    Old,
    New,
}

/// One entry of the candidate keylist.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Address-book row this key belongs to.
    pub id: i64,
    /// Old or new channel key.
    pub age: KeyAge,
    /// Public form, for the `CIDBox` cross-check.
    pub pubkey: [u8; 32],
}

/// Split a `msgC` into `(CIDToken, CIDBox, msgD)`.
pub fn parse_msg_c(msg_c: &[u8]) -> Result<([u8; CID_TOKEN_LENGTH], Vec<u8>, Vec<u8>)> {
    let body = msg_c
        .strip_prefix(MSG_C_PREFIX)
        .ok_or_else(|| ChannelError::Protocol("msgC prefix missing".into()))?;
    if body.len() < CID_TOKEN_LENGTH {
        return Err(ChannelError::Protocol("msgC too short".into()));
    }
    let cid_token: [u8; CID_TOKEN_LENGTH] = body[..CID_TOKEN_LENGTH]
        .try_into()
        .map_err(|_| ChannelError::Protocol("msgC token malformed".into()))?;
    let (cid_box, msg_d) = split_netstring_and_trailer(&body[CID_TOKEN_LENGTH..])?;
    Ok((cid_token, cid_box, msg_d))
}

/// Resolve a channel hint from the `CIDToken`.
///
/// The precomputed next-token index (`next_cid_token`) is not populated
/// yet, so this never hints; the `CIDBox` scan below is authoritative.
pub fn find_channel_from_cid_token(
    _conn: &Connection,
    _cid_token: &[u8; CID_TOKEN_LENGTH],
) -> (Option<i64>, Option<[u8; 32]>) {
    (None, None)
}

/// Resolve a channel hint by trial-decrypting the `CIDBox` against every
/// channel's CID key. A successful decryption is authoritative; a stale
/// seqnum inside it is a replay and rejects the message outright.
pub fn find_channel_from_cid_box(
    conn: &Connection,
    cid_box: &[u8],
) -> Result<(Option<i64>, Option<[u8; 32]>)> {
    for row in addressbook::scan_cid_keys(conn)? {
        let cid_key = match decode_key32(&row.my_cid_key) {
            Ok(key) => key,
            Err(_) => continue,
        };
        if let Ok((seqnum, _h_msg_d, channel_pubkey)) = open_cid_box(&cid_key, cid_box) {
            if seqnum <= row.highest_inbound_seqnum {
                tracing::warn!(
                    channel = row.id,
                    seqnum,
                    highest = row.highest_inbound_seqnum,
                    "rejecting replayed message"
                );
                return Err(ChannelError::Replay);
            }
            return Ok((Some(row.id), Some(channel_pubkey)));
        }
    }
    Ok((None, None))
}

/// Emit `(privkey, candidate)` pairs for the hinted channel, or for every
/// channel when there is no hint.
pub fn build_channel_keylist(
    conn: &Connection,
    known_cid: Option<i64>,
) -> Result<Vec<(X25519StaticSecret, Candidate)>> {
    let mut keylist = Vec::new();
    for row in addressbook::channel_keys(conn, known_cid)? {
        for (age, hex_key) in [
            (KeyAge::Old, &row.my_old_channel_privkey),
            (KeyAge::New, &row.my_new_channel_privkey),
        ] {
            let privkey = X25519StaticSecret::from_bytes(decode_key32(hex_key)?);
            let pubkey = privkey.public_key().to_bytes();
            keylist.push((
                privkey,
                Candidate {
                    id: row.id,
                    age,
                    pubkey,
                },
            ));
        }
    }
    // Try new keys first so a rotation is noticed as soon as the peer
    // starts using it.
    keylist.sort_by_key(|(_, candidate)| match candidate.age {
        KeyAge::New => 0,
        KeyAge::Old => 1,
    });
    Ok(keylist)
}

/// Keep only candidates whose public key matches the hint.
pub fn filter_on_known_channel_pubkey(
    keylist: Vec<(X25519StaticSecret, Candidate)>,
    known_channel_pubkey: &[u8; 32],
) -> Vec<(X25519StaticSecret, Candidate)> {
    keylist
        .into_iter()
        .filter(|(_, candidate)| candidate.pubkey == *known_channel_pubkey)
        .collect()
}

/// Build the candidate list, narrowed by whatever hints resolved.
pub fn find_channel_list(
    conn: &Connection,
    cid_token: &[u8; CID_TOKEN_LENGTH],
    cid_box: &[u8],
) -> Result<Vec<(X25519StaticSecret, Candidate)>> {
    let (mut cid, mut known_pubkey) = find_channel_from_cid_token(conn, cid_token);
    if cid.is_none() {
        let (box_cid, box_pubkey) = find_channel_from_cid_box(conn, cid_box)?;
        cid = box_cid;
        known_pubkey = box_pubkey;
    }
    let keylist = build_channel_keylist(conn, cid)?;
    Ok(match known_pubkey {
        Some(pubkey) => filter_on_known_channel_pubkey(keylist, &pubkey),
        None => keylist,
    })
}

/// Trial-decrypt `msgD` with each candidate key. First success wins.
///
/// Returns `(winning candidate, pub₂, msgE)`, or `None` when nothing
/// decrypts.
#[allow(clippy::type_complexity)]
pub fn decrypt_msg_d(
    msg_d: &[u8],
    keylist: &[(X25519StaticSecret, Candidate)],
) -> Result<Option<(Candidate, [u8; 32], Vec<u8>)>> {
    if msg_d.len() < 32 {
        return Err(ChannelError::Protocol("msgD too short".into()));
    }
    let pubkey2: [u8; 32] = msg_d[..32]
        .try_into()
        .map_err(|_| ChannelError::Protocol("msgD pubkey malformed".into()))?;
    let sender = X25519PublicKey::from_bytes(pubkey2);
    let sealed = &msg_d[32..];

    for (privkey, candidate) in keylist {
        if let Ok(msg_e) = boxes::box_open(&sender, privkey, sealed) {
            return Ok(Some((candidate.clone(), pubkey2, msg_e)));
        }
    }
    Ok(None)
}

/// Verify `msgE`: seqnum freshness, the signed ephemeral-key binding, and
/// the JSON payload. Returns `(seqnum, payload)`.
pub fn check_msg_e(
    msg_e: &[u8],
    pubkey2: &[u8; 32],
    sender_verfkey: &VerifyingKey,
    highest_seqnum: u64,
) -> Result<(u64, serde_json::Value)> {
    if msg_e.len() < 8 {
        return Err(ChannelError::Protocol("msgE too short".into()));
    }
    let seqnum_bytes: [u8; 8] = msg_e[..8]
        .try_into()
        .map_err(|_| ChannelError::Protocol("msgE seqnum malformed".into()))?;
    let seqnum = u64::from_be_bytes(seqnum_bytes);
    if seqnum <= highest_seqnum {
        return Err(ChannelError::Replay);
    }

    let (signed_block, payload_bytes) = split_netstring_and_trailer(&msg_e[8..])?;
    let bound_key = match verify_with_prefix(sender_verfkey, &signed_block, MSG_E_AUTH_PREFIX)
    {
        Ok(bound_key) => bound_key,
        Err(CryptoError::BadPrefix) => return Err(ChannelError::WrongVerfkey),
        Err(e) => return Err(e.into()),
    };
    // The signed block must name exactly the ephemeral key that sealed
    // msgD; this proves the peer meant to send it without giving us a
    // transferable proof.
    if bound_key != *pubkey2 {
        return Err(ChannelError::WrongVerfkey);
    }

    let payload = serde_json::from_slice(&payload_bytes)
        .map_err(|e| ChannelError::Protocol(format!("payload decoding: {e}")))?;
    Ok((seqnum, payload))
}

/// Cross-validate the outer `msgC` claims against the winning channel.
pub fn validate_msg_c(
    cid_key: &[u8; 32],
    channel_pubkey: &[u8; 32],
    seqnum_from_msg_e: u64,
    cid_box: &[u8],
    cid_token: &[u8; CID_TOKEN_LENGTH],
    msg_d: &[u8],
) -> Result<()> {
    let (seqnum_from_cid_box, h_msg_d, pubkey_from_cid_box) =
        open_cid_box(cid_key, cid_box)?;
    if seqnum_from_cid_box != seqnum_from_msg_e {
        return Err(ChannelError::Protocol("CIDBox seqnum mismatch".into()));
    }
    if pubkey_from_cid_box != *channel_pubkey {
        return Err(ChannelError::Protocol("CIDBox pubkey mismatch".into()));
    }
    if h_msg_d != sha256::hash(msg_d) {
        return Err(ChannelError::Protocol("CIDBox msgD hash mismatch".into()));
    }
    if build_cid_token(cid_key, seqnum_from_msg_e) != *cid_token {
        return Err(ChannelError::Protocol("CIDToken mismatch".into()));
    }
    Ok(())
}

/// Run the whole inbound pipeline on one `msgC`.
///
/// On success commits the advanced `highest_inbound_seqnum` (and the
/// new-key observation, when the `New` candidate won) and returns
/// `(addressbook_id, payload)`.
pub fn process_msg_c(
    db: &mut ObservableDb,
    msg_c: &[u8],
) -> Result<(i64, serde_json::Value)> {
    let (cid_token, cid_box, msg_d) = parse_msg_c(msg_c)?;
    let keylist = find_channel_list(db.conn(), &cid_token, &cid_box)?;
    let Some((candidate, pubkey2, msg_e)) = decrypt_msg_d(&msg_d, &keylist)? else {
        return Err(ChannelError::UnknownChannel);
    };

    let entry = addressbook::get(db.conn(), candidate.id)?;
    let sender_verfkey = VerifyingKey::from_bytes(&decode_key32(&entry.their_verify_key)?)?;
    let (seqnum, payload) = check_msg_e(
        &msg_e,
        &pubkey2,
        &sender_verfkey,
        entry.highest_inbound_seqnum,
    )?;

    let my_cid_key = decode_key32(&entry.my_cid_key)?;
    validate_msg_c(
        &my_cid_key,
        &candidate.pubkey,
        seqnum,
        &cid_box,
        &cid_token,
        &msg_d,
    )?;

    db.update(
        "UPDATE addressbook SET highest_inbound_seqnum = ?1 WHERE id = ?2",
        [seqnum as i64, candidate.id],
        "addressbook",
        candidate.id,
    )?;
    if candidate.age == KeyAge::New && !entry.they_used_new_channel_key {
        db.update(
            "UPDATE addressbook SET they_used_new_channel_key = 1 WHERE id = ?1",
            [candidate.id],
            "addressbook",
            candidate.id,
        )?;
    }
    db.commit()?;

    Ok((candidate.id, payload))
}
