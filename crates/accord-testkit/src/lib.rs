//! Accord test kit
//!
//! In-memory implementations of the engine's collaborator traits, used as a
//! dev-dependency by the engine crates:
//!
//! - [`MemoryWallet`] — a [`accord_core::effects::WalletStore`] backed by
//!   plain maps, with seeding helpers and write-back accessors
//! - [`ScriptedNotary`] — a [`accord_core::effects::NotaryActions`] that
//!   records every executed action and returns programmed outcomes

#![forbid(unsafe_code)]

mod notary;
mod wallet;

pub use notary::{ActionCall, ActionKind, ScriptedNotary, ScriptedOutcome};
pub use wallet::MemoryWallet;
