//! The rendezvous bus contract, and an in-process implementation.
//!
//! A rendezvous channel is an append-only **set** of opaque messages named
//! by an invite id. Delivery is at-least-once and unordered; duplicates
//! collapse. The invitation layer owns all resend and idempotence logic, so
//! a bus only has to remember what was posted.
//!
//! The channel name is the hex of the pairing's verify key, which lets even
//! an untrusted bus validate frames. [`LocalRendezvousBus`] uses that to
//! honor the teardown handshake: after observing two distinct validly
//! signed `i0:destroy:` bodies it discards the channel.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use burrow_crypto::ed25519::VerifyingKey;

/// A connection to one or more rendezvous servers.
pub trait Rendezvous {
    /// Begin receiving every message ever posted under `invite_id`.
    fn subscribe(&mut self, invite_id: &str);
    /// Stop receiving messages for `invite_id`.
    fn unsubscribe(&mut self, invite_id: &str);
    /// Publish a message to every subscriber of `invite_id`.
    fn send(&mut self, invite_id: &str, msg: &str);
    /// Fetch the current message set of every subscribed channel.
    fn poll(&mut self) -> Vec<(String, BTreeSet<String>)>;
}

const DESTROY_BODY_PREFIX: &[u8] = b"i0:destroy:";

#[derive(Default)]
struct BusInner {
    channels: HashMap<String, BTreeSet<String>>,
    destroys: HashMap<String, BTreeSet<String>>,
}

impl BusInner {
    fn post(&mut self, invite_id: &str, msg: &str) {
        self.channels
            .entry(invite_id.to_string())
            .or_default()
            .insert(msg.to_string());

        if let Some(body) = verify_frame(invite_id, msg) {
            if body.starts_with(DESTROY_BODY_PREFIX) {
                let destroys = self.destroys.entry(invite_id.to_string()).or_default();
                destroys.insert(msg.to_string());
                // Both sides have signed off; the channel can go away.
                if destroys.len() >= 2 {
                    self.channels.remove(invite_id);
                    self.destroys.remove(invite_id);
                }
            }
        }
    }
}

/// Check a frame against the channel's own name (the verify key) and return
/// the signed body.
fn verify_frame(invite_id: &str, msg: &str) -> Option<Vec<u8>> {
    let key_bytes: [u8; 32] = hex::decode(invite_id).ok()?.try_into().ok()?;
    let key = VerifyingKey::from_bytes(&key_bytes).ok()?;
    let signed = hex::decode(msg.strip_prefix("r0:")?).ok()?;
    key.verify_attached(&signed).ok()
}

/// An in-process rendezvous bus shared by every client attached to it.
#[derive(Clone, Default)]
pub struct LocalRendezvousBus {
    inner: Rc<RefCell<BusInner>>,
}

impl LocalRendezvousBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new client.
    pub fn client(&self) -> LocalRendezvousClient {
        LocalRendezvousClient {
            inner: Rc::clone(&self.inner),
            subscriptions: BTreeSet::new(),
        }
    }

    /// Whether a channel still holds messages (false once torn down).
    pub fn channel_exists(&self, invite_id: &str) -> bool {
        self.inner.borrow().channels.contains_key(invite_id)
    }
}

/// One node's connection to a [`LocalRendezvousBus`].
pub struct LocalRendezvousClient {
    inner: Rc<RefCell<BusInner>>,
    subscriptions: BTreeSet<String>,
}

impl Rendezvous for LocalRendezvousClient {
    fn subscribe(&mut self, invite_id: &str) {
        self.subscriptions.insert(invite_id.to_string());
    }

    fn unsubscribe(&mut self, invite_id: &str) {
        self.subscriptions.remove(invite_id);
    }

    fn send(&mut self, invite_id: &str, msg: &str) {
        self.inner.borrow_mut().post(invite_id, msg);
    }

    fn poll(&mut self) -> Vec<(String, BTreeSet<String>)> {
        let inner = self.inner.borrow();
        self.subscriptions
            .iter()
            .filter_map(|id| {
                inner
                    .channels
                    .get(id)
                    .filter(|messages| !messages.is_empty())
                    .map(|messages| (id.clone(), messages.clone()))
            })
            .collect()
    }
}
