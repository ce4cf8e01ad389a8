//! Identity claim metadata and contract references
//!
//! Issuer identities advertise, through their claim metadata, which notary
//! they operate on and which unit definitions they offer accounts against.
//! The pairing state machine reads these claims to decide what to register
//! and maintain; it never parses the underlying credential format.

use crate::types::{NotaryId, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a unit definition within an issuer's contract offerings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Currency-style unit
    Currency,
    /// Commodity-style unit
    Commodity,
    /// Security-style unit
    Security,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Currency => "currency",
            Self::Commodity => "commodity",
            Self::Security => "security",
        };
        f.write_str(name)
    }
}

/// One contract-offering claim: the issuer offers accounts for this unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOffering {
    /// Claim classification of the unit
    pub kind: UnitKind,
    /// The unit definition on offer
    pub unit: UnitId,
}

/// Claim metadata the engine reads from an identity record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// The notary this identity prefers for its exchanges
    pub preferred_notary: Option<NotaryId>,
    /// Contract offerings advertised by this identity
    pub offerings: Vec<ContractOffering>,
}

/// Reference to a downloadable contract definition
///
/// The download-contract operation queue carries either kind; the notary
/// resolves the ID within its contract store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractId {
    /// A notary contract
    Notary(NotaryId),
    /// A unit definition contract
    Unit(UnitId),
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notary(id) => id.fmt(f),
            Self::Unit(id) => id.fmt(f),
        }
    }
}
