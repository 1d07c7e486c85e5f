//! Integration test: mailbox token recognition.
//!
//! A delivery whose rerandomized token does not map to a registered
//! customer must vanish without a trace upward, firing the operator hook
//! exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use burrow_invite::rendezvous::LocalRendezvousBus;
use burrow_integration_tests::paired_nodes;
use burrow_transport::create_msg_a;

const CODE: &[u8] = b"code";

#[test]
fn test_unknown_token_signals_operator_hook() {
    let bus = LocalRendezvousBus::new();
    let (node_a, mut node_b) = paired_nodes(&bus, CODE);

    let unknowns = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&unknowns);
    node_b
        .mailbox
        .on_unknown_token(move |event| sink.borrow_mut().push(event));

    // Take B's published transport record from A's address book, but swap
    // in a token from a freshly created identity B has never seen.
    let entry_a = &node_a.addressbook()[0];
    let record =
        burrow_types::records::ChannelRecord::from_json(&entry_a.their_channel_record_json)
            .expect("record");
    let mut bad_trec = record.transports[0].clone();
    let (_tokenid, _privkey, foreign_token) = burrow_rrid::create();
    bad_trec.stid = burrow_rrid::randomize(&foreign_token)
        .expect("randomize")
        .to_vec();

    let msg_a = create_msg_a(&bad_trec, b"msgC").expect("wrap");
    node_b.mailbox.handle_msg_a(&msg_a).expect("handle");

    assert_eq!(unknowns.borrow().len(), 1);
    assert!(node_b.delivered.borrow().is_empty());
}

#[test]
fn test_known_token_still_delivers() {
    let bus = LocalRendezvousBus::new();
    let (node_a, node_b) = paired_nodes(&bus, CODE);

    let entry_a = &node_a.addressbook()[0];
    let record =
        burrow_types::records::ChannelRecord::from_json(&entry_a.their_channel_record_json)
            .expect("record");

    let msg_a = create_msg_a(&record.transports[0], b"msgC").expect("wrap");
    node_b.mailbox.handle_msg_a(&msg_a).expect("handle");
    assert_eq!(node_b.delivered.borrow().as_slice(), &[b"msgC".to_vec()]);
}
