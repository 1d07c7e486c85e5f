//! # burrow-invite
//!
//! The invitation protocol: a four-phase rendezvous exchange that turns a
//! short out-of-band code into a mutually authenticated address-book entry.
//!
//! Both peers stretch the shared code into the same Ed25519 key; its verify
//! key names an untrusted broadcast channel, and every frame on that channel
//! is signed with it (`"r0:" ‖ hex(signed)`). Inside the frames:
//!
//! ```text
//! A → B   i0:m1: ‖ tempA                      (and symmetrically B → A)
//! B → A   i0:m2: ‖ box(to=tempA, from=tempB, i0:m2a: ‖ verfB ‖ sign(tempA‖tempB‖recordB))
//! A → B   i0:m3:ACK- ‖ nonce
//! both    i0:destroy: ‖ nonce                 (2-of-2 teardown)
//! ```
//!
//! The rendezvous is lossy and unordered; [`invitation`] owns all
//! idempotence, [`manager`] drives the machine, [`rendezvous`] is the bus
//! contract.

pub mod invitation;
pub mod manager;
pub mod rendezvous;
pub mod util;

/// Error types for invitation operations.
#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    /// A rendezvous frame failed framing or signature checks. The channel
    /// is abandoned.
    #[error("rendezvous channel is corrupt")]
    CorruptChannel,

    /// An M2 cross-reference check failed. The channel is abandoned.
    #[error("M2 binding check failed")]
    BindingFailure,

    /// An invitation with this code is already pending.
    #[error("invitation code already in use")]
    DuplicateCode,

    /// Messages arrived for a rendezvous channel with no pending invitation.
    #[error("no pending invitation for channel {0}")]
    UnknownInvite(String),

    /// Store failure (fatal to the caller).
    #[error(transparent)]
    Db(#[from] burrow_db::DbError),

    /// Cryptographic failure outside the inbound verification path.
    #[error(transparent)]
    Crypto(#[from] burrow_crypto::CryptoError),

    /// Channel-record encoding failure.
    #[error(transparent)]
    Record(#[from] burrow_types::records::RecordError),
}

pub type Result<T> = std::result::Result<T, InviteError>;
