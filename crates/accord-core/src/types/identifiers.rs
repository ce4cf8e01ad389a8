//! Core identifier types used across the Accord engine
//!
//! Every entity the engine coordinates — identities, notaries, unit
//! definitions, accounts, peer requests and replies, background tasks — is
//! addressed by one of these newtypes. All of them wrap a [`Uuid`], and the
//! nil UUID is reserved as the "empty" identifier used by validation and by
//! schedule APIs to signal a rejected or deduplicated task.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity identifier for local and remote entities
///
/// Identifies one cryptographic identity, whether locally controlled or a
/// remote counterparty (issuer). The engine never distinguishes the two at
/// the type level; ownership is a property of the wallet collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    /// Create a new random identity ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identity-{}", self.0)
    }
}

/// Notary identifier
///
/// Identifies one counterparty network (notary) an identity can register
/// with. Issuer identities advertise a preferred notary in their claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotaryId(pub Uuid);

impl NotaryId {
    /// Create a new random notary ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for NotaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notary-{}", self.0)
    }
}

/// Unit definition identifier
///
/// Identifies one contract an issuer offers accounts against (a currency,
/// commodity, or security definition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub Uuid);

impl UnitId {
    /// Create a new random unit ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Account identifier
///
/// Returned by the notary when an account is registered against a unit
/// definition; recorded on the issuer bookkeeping record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Create a new random account ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account-{}", self.0)
    }
}

/// Peer request identifier
///
/// Identifies one peer-protocol request. Replies correlate back to the
/// request that initiated them via this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// Peer reply identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplyId(pub Uuid);

impl ReplyId {
    /// Create a new random reply ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ReplyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reply-{}", self.0)
    }
}

/// Background task identifier
///
/// Handed back by the scheduling APIs so callers can poll task status. The
/// nil task ID means the task was not scheduled (validation failure or an
/// identical task already pending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The empty identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the empty identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_identifiers_are_recognized() {
        assert!(IdentityId::nil().is_nil());
        assert!(TaskId::nil().is_nil());
        assert!(!IdentityId::new().is_nil());
    }

    #[test]
    fn display_includes_kind_prefix() {
        let id = NotaryId::new();
        assert!(id.to_string().starts_with("notary-"));
    }

    #[test]
    fn identifiers_are_ordered_and_hashable() {
        use std::collections::BTreeSet;
        let mut set = BTreeSet::new();
        set.insert(IdentityId::new());
        set.insert(IdentityId::new());
        assert_eq!(set.len(), 2);
    }
}
