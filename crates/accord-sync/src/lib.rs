//! Accord-Sync: background synchronization engine
//!
//! Keeps local mirrors of remote account, contract, and mailbox state fresh
//! by repeatedly issuing idempotent remote operations until they succeed.
//!
//! # Architecture
//!
//! - [`SyncEngine`] owns one [`OperationQueue`] bundle and one background
//!   worker per (local identity, notary) context
//! - every queue is a dedup queue: duplicate schedule calls collapse into
//!   the pending task, so producers can signal as often as they like
//! - workers sleep on their bundle's wakeup and drain in a fixed order;
//!   remote actions run one at a time behind the process-wide session gate
//! - task lifecycles are observable through the injected
//!   [`TaskStatusRegistry`]
//!
//! The pairing engine drives this crate through the `schedule_*`/`find_*`
//! APIs; applications can use them directly as well.

#![forbid(unsafe_code)]

mod engine;
mod queue;
mod status;
mod worker;

pub use engine::{SyncConfig, SyncEngine};
pub use queue::{ContextId, MessageTask, OperationQueue};
pub use status::{TaskStatus, TaskStatusRegistry};
