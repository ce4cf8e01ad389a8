//! Pair status book
//!
//! Process-wide map from (local identity, issuer identity) to the pair's
//! negotiation state and trust flag. Entries are created on first reference
//! and live for the life of the book; the book is constructed explicitly and
//! injected into the engine so callers and tests can observe it directly.

use accord_core::IdentityId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key of one pairing relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    /// The locally-controlled identity
    pub local: IdentityId,
    /// The issuer identity being paired with
    pub issuer: IdentityId,
}

/// Negotiation state of one pair
///
/// `Error` is only a marker meaning "retry from the top": the next sweep
/// falls through it into `Started` unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairState {
    /// Retry marker; prerequisites were missing on the last sweep
    #[default]
    Error,
    /// Prerequisites resolved, registration not yet confirmed
    Started,
    /// Registered on the issuer's notary; steady-state maintenance runs
    Registered,
}

/// Status of one pairing relationship
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairStatus {
    /// Current negotiation state
    pub state: PairState,
    /// Whether the issuer record carries the trust (paired) flag
    pub trusted: bool,
}

/// Map of every pairing relationship's status
#[derive(Debug, Default)]
pub struct PairStatusBook {
    inner: Mutex<HashMap<PairKey, PairStatus>>,
}

impl PairStatusBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a pair, creating the entry on first reference
    pub fn get(&self, key: PairKey) -> PairStatus {
        *self.inner.lock().entry(key).or_default()
    }

    /// Update the negotiation state of a pair
    pub fn set_state(&self, key: PairKey, state: PairState) {
        self.inner.lock().entry(key).or_default().state = state;
    }

    /// Update the trust flag of a pair
    pub fn set_trusted(&self, key: PairKey, trusted: bool) {
        self.inner.lock().entry(key).or_default().trusted = trusted;
    }

    /// Copy of every tracked pair and its status
    pub fn snapshot(&self) -> Vec<(PairKey, PairStatus)> {
        self.inner
            .lock()
            .iter()
            .map(|(key, status)| (*key, *status))
            .collect()
    }

    /// Number of tracked pairs
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no pair has been referenced yet
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
