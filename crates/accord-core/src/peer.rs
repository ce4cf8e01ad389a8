//! Peer-protocol message model
//!
//! The engine exchanges a small family of request/reply messages with issuer
//! identities through collaborator-owned mailboxes. Only the envelope-level
//! fields the engine dispatches on are modeled here; payload bytes stay with
//! the wallet collaborator.

use crate::types::{IdentityId, NotaryId, ReplyId, RequestId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a peer-protocol request (and of the reply correlating to it)
///
/// Dispatch is an exhaustive match over this enum; kinds the pairing engine
/// does not handle are skipped explicitly, never by a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeerRequestKind {
    /// Request for bailment (deposit) instructions against one unit
    Bailment,
    /// Request to withdraw (outbail) against one unit
    Outbailment,
    /// Issuer-originated notification that a bailment is pending
    PendingBailment,
    /// Request for connection credentials of a given [`ConnectionKind`]
    ConnectionInfo,
    /// Request that the issuer escrow a wallet secret
    StoreSecret,
    /// Offer of a third-party verification credential
    VerificationOffer,
    /// Faucet request for test funds
    Faucet,
}

impl fmt::Display for PeerRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bailment => "bailment",
            Self::Outbailment => "outbailment",
            Self::PendingBailment => "pending-bailment",
            Self::ConnectionInfo => "connection-info",
            Self::StoreSecret => "store-secret",
            Self::VerificationOffer => "verification-offer",
            Self::Faucet => "faucet",
        };
        f.write_str(name)
    }
}

/// Kind of connection credentials a connection-info exchange covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Bitcoin-style RPC endpoint credentials
    BtcRpc,
    /// SSH endpoint credentials
    Ssh,
    /// Overlay-network address
    Overlay,
}

/// The connection kind the pairing steady-state loop requests from every
/// trusted issuer.
pub const PAIRING_CONNECTION_KIND: ConnectionKind = ConnectionKind::BtcRpc;

/// Kind of secret escrowed through a store-secret exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretKind {
    /// BIP-39 seed words plus passphrase
    Bip39,
}

/// Envelope of an incoming peer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Request identifier
    pub id: RequestId,
    /// Declared message kind
    pub kind: PeerRequestKind,
    /// Identity that initiated the request
    pub initiator: IdentityId,
    /// Identity the request is addressed to
    pub recipient: IdentityId,
    /// Notary the exchange is routed through
    pub notary: NotaryId,
    /// For [`PeerRequestKind::PendingBailment`]: the bailment request this
    /// notification refers back to
    pub reference: Option<RequestId>,
}

/// Envelope of an incoming peer reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReply {
    /// Reply identifier
    pub id: ReplyId,
    /// Kind of the request this reply answers
    pub kind: PeerRequestKind,
    /// Identity that initiated the original request
    pub initiator: IdentityId,
    /// Identity that produced the reply
    pub recipient: IdentityId,
    /// The request being answered
    pub request: RequestId,
    /// Whether the counterparty reports success
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_kebab_case() {
        assert_eq!(PeerRequestKind::PendingBailment.to_string(), "pending-bailment");
        assert_eq!(PeerRequestKind::StoreSecret.to_string(), "store-secret");
    }
}
