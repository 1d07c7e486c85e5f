//! Small helpers for the stored message sets and wire framing.

use std::collections::BTreeSet;

/// Split a comma-joined message column into a set. The empty column is the
/// empty set, never `{""}`.
pub fn split_messages(s: &str) -> BTreeSet<String> {
    if s.is_empty() {
        return BTreeSet::new();
    }
    s.split(',').map(str::to_string).collect()
}

/// Join a message set back into its column form.
pub fn join_messages(messages: &BTreeSet<String>) -> String {
    messages
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether a string is a well-formed rendezvous frame: `"r0:"` followed by
/// nonempty lowercase hex.
pub fn is_valid_wire_message(msg: &str) -> bool {
    match msg.strip_prefix("r0:") {
        Some(rest) => {
            !rest.is_empty()
                && rest
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}
