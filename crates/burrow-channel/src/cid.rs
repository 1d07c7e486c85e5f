//! Channel identification: `CIDToken` and `CIDBox`.
//!
//! Both derive from the receiver-chosen CID key. The token is a cheap
//! per-seqnum lookup hint; the box is the authoritative binding, sealing
//! `seqnum(8) ‖ SHA256(msgD) ‖ channel_pubkey(32)` so the receiver can
//! cross-check everything the outer layers claimed.

use burrow_crypto::boxes::{secretbox_open, secretbox_seal};
use burrow_crypto::hkdf::hkdf_sha256_32;

use crate::{ChannelError, Result};

/// Fixed width of the `CIDToken` inside `msgC`.
pub const CID_TOKEN_LENGTH: usize = 32;

const CID_TOKEN_INFO: &[u8] = b"petmail.org/v1/CIDToken";

/// Derive the per-message channel token: `HKDF(CID_key ‖ seqnum_be8)`.
pub fn build_cid_token(cid_key: &[u8; 32], seqnum: u64) -> [u8; CID_TOKEN_LENGTH] {
    let mut ikm = Vec::with_capacity(40);
    ikm.extend_from_slice(cid_key);
    ikm.extend_from_slice(&seqnum.to_be_bytes());
    hkdf_sha256_32(&ikm, CID_TOKEN_INFO)
}

/// Seal the channel-identification box.
pub fn seal_cid_box(
    cid_key: &[u8; 32],
    seqnum: u64,
    h_msg_d: &[u8; 32],
    channel_pubkey: &[u8; 32],
) -> Result<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(8 + 32 + 32);
    plaintext.extend_from_slice(&seqnum.to_be_bytes());
    plaintext.extend_from_slice(h_msg_d);
    plaintext.extend_from_slice(channel_pubkey);
    Ok(secretbox_seal(cid_key, &plaintext)?)
}

/// Open a `CIDBox`, yielding `(seqnum, H(msgD), channel_pubkey)`.
///
/// Fails when this CID key did not seal the box — the basis of the inbound
/// trial-decryption scan.
pub fn open_cid_box(cid_key: &[u8; 32], cid_box: &[u8]) -> Result<(u64, [u8; 32], [u8; 32])> {
    let plaintext = secretbox_open(cid_key, cid_box)?;
    if plaintext.len() != 8 + 32 + 32 {
        return Err(ChannelError::Protocol("CIDBox payload malformed".into()));
    }
    let seqnum_bytes: [u8; 8] = plaintext[..8]
        .try_into()
        .map_err(|_| ChannelError::Protocol("CIDBox seqnum malformed".into()))?;
    let h_msg_d: [u8; 32] = plaintext[8..40]
        .try_into()
        .map_err(|_| ChannelError::Protocol("CIDBox hash malformed".into()))?;
    let channel_pubkey: [u8; 32] = plaintext[40..]
        .try_into()
        .map_err(|_| ChannelError::Protocol("CIDBox pubkey malformed".into()))?;
    Ok((u64::from_be_bytes(seqnum_bytes), h_msg_d, channel_pubkey))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_deterministic_per_seqnum() {
        let key = [0x42u8; 32];
        assert_eq!(build_cid_token(&key, 7), build_cid_token(&key, 7));
        assert_ne!(build_cid_token(&key, 7), build_cid_token(&key, 8));
    }

    #[test]
    fn test_token_depends_on_key() {
        assert_ne!(
            build_cid_token(&[0x01u8; 32], 1),
            build_cid_token(&[0x02u8; 32], 1)
        );
    }

    #[test]
    fn test_cid_box_roundtrip() {
        let key = [0x42u8; 32];
        let h = [0xAAu8; 32];
        let pubkey = [0xBBu8; 32];
        let sealed = seal_cid_box(&key, 9, &h, &pubkey).expect("seal");
        let (seqnum, h2, pubkey2) = open_cid_box(&key, &sealed).expect("open");
        assert_eq!(seqnum, 9);
        assert_eq!(h2, h);
        assert_eq!(pubkey2, pubkey);
    }

    #[test]
    fn test_cid_box_wrong_key_fails() {
        let sealed =
            seal_cid_box(&[0x01u8; 32], 1, &[0u8; 32], &[0u8; 32]).expect("seal");
        assert!(open_cid_box(&[0x02u8; 32], &sealed).is_err());
    }
}
