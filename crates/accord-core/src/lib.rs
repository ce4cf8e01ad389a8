//! Accord core: shared types, queue primitives, and collaborator traits
//!
//! Foundation crate for the Accord pairing and synchronization engines.
//! It defines:
//!
//! - the identifier newtypes and the peer-protocol message model
//! - the issuer bookkeeping record and its exclusive editor lease
//! - [`DedupQueue`], the set-backed FIFO primitive behind every operation
//!   queue and dirty-signal channel in the engine
//! - cooperative shutdown signaling ([`ShutdownController`] /
//!   [`ShutdownToken`])
//! - the collaborator traits the engines are parameterized by
//!   ([`effects::NotaryActions`], [`effects::WalletStore`]) and the
//!   process-wide [`effects::SessionGate`]
//!
//! No I/O happens in this crate; everything here is data and coordination.

#![forbid(unsafe_code)]

pub mod claims;
pub mod effects;
pub mod errors;
pub mod issuer;
pub mod peer;
pub mod queue;
pub mod task;
pub mod types;

pub use claims::{ContractId, ContractOffering, IdentityClaims, UnitKind};
pub use errors::{AccordError, AccordResult};
pub use issuer::{IssuerEditor, IssuerRecord};
pub use peer::{
    ConnectionKind, PeerReply, PeerRequest, PeerRequestKind, SecretKind,
    PAIRING_CONNECTION_KIND,
};
pub use queue::DedupQueue;
pub use task::{ShutdownController, ShutdownToken};
pub use types::{AccountId, IdentityId, NotaryId, ReplyId, RequestId, TaskId, UnitId};
