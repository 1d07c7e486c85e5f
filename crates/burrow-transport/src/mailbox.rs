//! The receiving mailbox.
//!
//! A [`MailboxServer`] owns one transport encryption key and one
//! rerandomizable-token identity. For every inbound `msgA` it unboxes the
//! envelope, maps the presented `MSTID` back to a stable tokenid, and — when
//! that tokenid is registered — hands the inner `msgC` to the local delivery
//! handler. Envelopes addressed to unknown tokenids are dropped, with a
//! one-shot signal to the operator hook; the presented token is malleable,
//! so an unknown result proves nothing about the sender.

use burrow_crypto::boxes;
use burrow_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use burrow_types::records::TransportRecord;
use std::collections::BTreeSet;

use crate::{parse_msg_a, parse_msg_b, Result, TransportError};

/// Fired when a delivery presents a token that maps to no registered
/// customer (or fails to parse at all).
#[derive(Clone, Debug)]
pub struct UnknownTokenEvent {
    /// The presented (rerandomized) token bytes.
    pub mstid: Vec<u8>,
}

type MsgCHandler = Box<dyn Fn(&[u8])>;
type UnknownTokenHandler = Box<dyn Fn(UnknownTokenEvent)>;

/// One mailbox: a transport keypair plus a token identity.
pub struct MailboxServer {
    transport_privkey: X25519StaticSecret,
    tid_privkey: [u8; burrow_rrid::PRIVKEY_LENGTH],
    token0: [u8; burrow_rrid::TOKEN_LENGTH],
    registered: BTreeSet<[u8; burrow_rrid::TOKENID_LENGTH]>,
    local_handler: Option<MsgCHandler>,
    unknown_token_handler: Option<UnknownTokenHandler>,
}

impl MailboxServer {
    /// Create a mailbox with a fresh transport key and token identity; the
    /// identity's tokenid starts out registered.
    pub fn new() -> Self {
        let (tokenid, tid_privkey, token0) = burrow_rrid::create();
        let mut registered = BTreeSet::new();
        registered.insert(tokenid);
        Self {
            transport_privkey: X25519StaticSecret::random(),
            tid_privkey,
            token0,
            registered,
            local_handler: None,
            unknown_token_handler: None,
        }
    }

    /// The mailbox's public encryption key, published to senders.
    pub fn transport_pubkey(&self) -> X25519PublicKey {
        self.transport_privkey.public_key()
    }

    /// Build the transport record a customer publishes in its channel
    /// record: senders rerandomize `stid` per message.
    pub fn record(&self, kind: &str, url: Option<String>) -> TransportRecord {
        TransportRecord {
            kind: kind.to_string(),
            transport_pubkey: self.transport_pubkey().to_bytes(),
            stid: self.token0.to_vec(),
            url,
        }
    }

    /// Register a handler receiving every `msgC` delivered to a known token.
    pub fn register_local_handler(&mut self, handler: impl Fn(&[u8]) + 'static) {
        self.local_handler = Some(Box::new(handler));
    }

    /// Register the operator hook for unrecognized tokens.
    pub fn on_unknown_token(&mut self, handler: impl Fn(UnknownTokenEvent) + 'static) {
        self.unknown_token_handler = Some(Box::new(handler));
    }

    /// Process one inbound `msgA`.
    ///
    /// Unknown tokenids are not an error: the envelope is dropped and the
    /// operator hook fires exactly once. Framing and decryption failures are
    /// errors to the caller (the transport layer retries or discards).
    pub fn handle_msg_a(&self, msg_a: &[u8]) -> Result<()> {
        let (pubkey1, sealed) = parse_msg_a(msg_a)?;
        let msg_b = boxes::box_open(
            &X25519PublicKey::from_bytes(pubkey1),
            &self.transport_privkey,
            &sealed,
        )
        .map_err(|_| TransportError::Protocol("msgA does not open".into()))?;
        let (mstid, msg_c) = parse_msg_b(&msg_b)?;

        let recognized = burrow_rrid::decrypt(&self.tid_privkey, &mstid)
            .ok()
            .filter(|tokenid| self.registered.contains(tokenid));

        match recognized {
            Some(_) => {
                if let Some(handler) = &self.local_handler {
                    handler(&msg_c);
                }
            }
            None => {
                tracing::debug!("dropping msgA for unrecognized mailbox token");
                if let Some(handler) = &self.unknown_token_handler {
                    handler(UnknownTokenEvent { mstid });
                }
            }
        }
        Ok(())
    }
}

impl Default for MailboxServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_msg_a;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_delivery_to_registered_token() {
        let mut mailbox = MailboxServer::new();
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        mailbox.register_local_handler(move |msg_c| sink.borrow_mut().push(msg_c.to_vec()));

        let record = mailbox.record("local", None);
        let msg_a = create_msg_a(&record, b"payload msgC").expect("wrap");
        mailbox.handle_msg_a(&msg_a).expect("handle");

        assert_eq!(delivered.borrow().as_slice(), &[b"payload msgC".to_vec()]);
    }

    #[test]
    fn test_unknown_token_signals_once_and_delivers_nothing() {
        let mut mailbox = MailboxServer::new();
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let unknowns = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        let unknown_sink = Rc::clone(&unknowns);
        mailbox.register_local_handler(move |msg_c| sink.borrow_mut().push(msg_c.to_vec()));
        mailbox.on_unknown_token(move |event| unknown_sink.borrow_mut().push(event));

        // A record carrying some other identity's freshly created token.
        let (_tokenid, _privkey, foreign_token) = burrow_rrid::create();
        let mut record = mailbox.record("local", None);
        record.stid = burrow_rrid::randomize(&foreign_token)
            .expect("randomize")
            .to_vec();

        let msg_a = create_msg_a(&record, b"msgC").expect("wrap");
        mailbox.handle_msg_a(&msg_a).expect("handle");

        assert!(delivered.borrow().is_empty());
        assert_eq!(unknowns.borrow().len(), 1);
    }

    #[test]
    fn test_garbage_envelope_is_an_error() {
        let mailbox = MailboxServer::new();
        assert!(mailbox.handle_msg_a(b"a0:not a real envelope").is_err());
    }
}
