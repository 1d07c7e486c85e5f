//! Shared harness for the end-to-end tests.
//!
//! A [`TestNode`] is a full node in miniature: an in-memory observable
//! store, an invitation manager wired to a shared in-process rendezvous
//! bus, and one local mailbox whose deliveries are captured for
//! inspection. Tests drive everything by explicit polls, the way the
//! production reactor would.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use burrow_db::queries::addressbook::{self, AddressbookEntry};
use burrow_db::SharedDb;
use burrow_invite::manager::InvitationManager;
use burrow_invite::rendezvous::LocalRendezvousBus;
use burrow_invite::util::split_messages;
use burrow_transport::mailbox::MailboxServer;
use burrow_types::records::TransportRecord;

/// One node under test.
pub struct TestNode {
    pub db: SharedDb,
    pub manager: InvitationManager,
    pub mailbox: MailboxServer,
    /// Every `msgC` the mailbox delivered upward.
    pub delivered: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl TestNode {
    /// Build a node attached to the given rendezvous bus.
    pub fn new(bus: &LocalRendezvousBus) -> Self {
        let db = burrow_db::open_memory_shared().expect("open in-memory store");
        let mut manager = InvitationManager::new(Rc::clone(&db));
        manager.add_rendezvous(Box::new(bus.client()));

        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        let mut mailbox = MailboxServer::new();
        mailbox.register_local_handler(move |msg_c| sink.borrow_mut().push(msg_c.to_vec()));

        Self {
            db,
            manager,
            mailbox,
            delivered,
        }
    }

    /// The transport table handed to `invite`: one local mailbox.
    pub fn transports(&self) -> BTreeMap<i64, TransportRecord> {
        BTreeMap::from([(0, self.mailbox.record("local", None))])
    }

    /// Start a pairing on this node.
    pub fn invite(&mut self, petname: &str, code: &[u8]) -> burrow_invite::Result<i64> {
        let transports = self.transports();
        self.manager.invite(petname, code, &transports)
    }

    /// Drive one rendezvous poll.
    pub fn poll(&mut self) {
        self.manager.poll().expect("poll");
    }

    /// The node's full address book.
    pub fn addressbook(&self) -> Vec<AddressbookEntry> {
        addressbook::list(self.db.borrow().conn()).expect("list addressbook")
    }
}

/// Message-set counters of a pending invitation, keyed by code.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageCounts {
    pub my: usize,
    pub theirs: usize,
    pub next: u32,
}

/// Read the counters for the invitation created from `code`, or `None`
/// once the invitation row is gone.
pub fn message_counts(node: &TestNode, code: &[u8]) -> Option<MessageCounts> {
    let db = node.db.borrow();
    let mut stmt = db
        .conn()
        .prepare(
            "SELECT my_messages, their_messages, next_expected_message
             FROM invitations WHERE code = ?1",
        )
        .expect("prepare");
    let mut rows = stmt.query([hex::encode(code)]).expect("query");
    let row = rows.next().expect("row fetch")?;
    let my: String = row.get(0).expect("my_messages");
    let theirs: String = row.get(1).expect("their_messages");
    let next: u32 = row.get(2).expect("next_expected_message");
    Some(MessageCounts {
        my: split_messages(&my).len(),
        theirs: split_messages(&theirs).len(),
        next,
    })
}

/// Assert an invitation's counters in one line.
pub fn check_counts(node: &TestNode, code: &[u8], my: usize, theirs: usize, next: u32) {
    let counts = message_counts(node, code).expect("invitation row should exist");
    assert_eq!(counts, MessageCounts { my, theirs, next });
}

/// Run a complete pairing between two fresh nodes on one bus and return
/// `(node_a, node_b)` with one acked address-book entry each.
pub fn paired_nodes(bus: &LocalRendezvousBus, code: &[u8]) -> (TestNode, TestNode) {
    let mut node_a = TestNode::new(bus);
    let mut node_b = TestNode::new(bus);
    node_a.invite("petname-from-a", code).expect("invite A");
    node_b.invite("petname-from-b", code).expect("invite B");

    node_a.poll();
    node_b.poll();
    node_a.poll();
    node_b.poll();
    node_a.poll();
    node_b.poll();

    (node_a, node_b)
}
