//! Accord-Pairing: per-issuer negotiation engine
//!
//! A local identity pairs with issuer identities by negotiating banking-style
//! services over an asynchronous, unreliable request/reply protocol. This
//! crate owns the negotiation:
//!
//! - [`PairingEngine`] — public surface (`add_issuer`, `issuer_list`,
//!   `issuer_details`, `update`) plus the per-pair state machine
//! - peer message dispatch — drains incoming request/reply mailboxes and
//!   correlates replies onto issuer bookkeeping
//! - supervision — at most one sweep worker at a time, a low-frequency
//!   refresh poller, graceful shutdown
//!
//! Remote operations are issued through [`accord_sync::SyncEngine`] and the
//! remote action capability; persistence belongs to the wallet collaborator.
//! Progress is incremental: every sweep re-evaluates idempotent
//! preconditions, so crashes, cancellations, and lost replies only ever
//! defer work to the next sweep.

#![forbid(unsafe_code)]

mod dispatch;
mod engine;
mod status;
mod supervisor;

pub use engine::{PairingConfig, PairingEngine, MINIMUM_UNUSED_BAILMENTS};
pub use status::{PairKey, PairState, PairStatus, PairStatusBook};
