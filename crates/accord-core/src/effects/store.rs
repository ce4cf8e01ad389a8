//! Wallet bookkeeping store
//!
//! The engine holds no persistent state of its own: identities, issuer
//! records, contracts, registration contexts, and peer mailboxes all live
//! behind this trait. Mutation of an issuer record goes through an exclusive
//! [`IssuerEditor`] lease; everything else is read access or a narrow,
//! idempotent write.

use crate::claims::IdentityClaims;
use crate::errors::AccordResult;
use crate::issuer::{IssuerEditor, IssuerRecord};
use crate::peer::{PeerReply, PeerRequest};
use crate::types::{AccountId, IdentityId, NotaryId, ReplyId, RequestId, UnitId};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Bookkeeping collaborator owned by the wallet
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Identities under local control
    fn local_identities(&self) -> Vec<IdentityId>;

    /// Issuer identities known for one local identity
    fn issuers(&self, local: IdentityId) -> BTreeSet<IdentityId>;

    /// Check out the exclusive mutation lease for one issuer record
    ///
    /// The record is created on first reference. The lease commits on
    /// release; callers hold it for at most one state-machine step or one
    /// dispatch handler.
    async fn edit_issuer(
        &self,
        local: IdentityId,
        issuer: IdentityId,
    ) -> AccordResult<IssuerEditor>;

    /// Read-only snapshot of one issuer record, if it exists
    async fn issuer(&self, local: IdentityId, issuer: IdentityId) -> Option<IssuerRecord>;

    /// Claim metadata of an identity, if its record is resolvable locally
    fn identity_claims(&self, id: IdentityId) -> Option<IdentityClaims>;

    /// Whether the notary's contract is known locally
    fn has_notary_contract(&self, id: NotaryId) -> bool;

    /// Whether the unit definition contract is known locally
    fn has_unit_contract(&self, id: UnitId) -> bool;

    /// Whether the local identity is registered on the notary
    fn is_registered(&self, local: IdentityId, notary: NotaryId) -> bool;

    /// Notaries the local identity is registered on
    fn registrations(&self, local: IdentityId) -> Vec<NotaryId>;

    /// Accounts the local identity holds on one notary
    fn accounts(&self, local: IdentityId, notary: NotaryId) -> Vec<AccountId>;

    /// Store the pairing secret as the admin credential of a registration
    /// context; idempotent
    async fn set_admin_secret(
        &self,
        local: IdentityId,
        notary: NotaryId,
        secret: &str,
    ) -> AccordResult<()>;

    /// Reply IDs waiting in the incoming peer-reply mailbox
    fn incoming_replies(&self, local: IdentityId) -> Vec<ReplyId>;

    /// Fetch one incoming peer reply
    fn peer_reply(&self, local: IdentityId, reply: ReplyId) -> Option<PeerReply>;

    /// Request IDs waiting in the incoming peer-request mailbox
    fn incoming_requests(&self, local: IdentityId) -> Vec<RequestId>;

    /// Fetch one incoming peer request
    fn peer_request(&self, local: IdentityId, request: RequestId) -> Option<PeerRequest>;

    /// Mark the stored peer request answered by this reply as complete
    fn complete_request(&self, local: IdentityId, reply: ReplyId) -> AccordResult<()>;

    /// Wallet seed words, escrowed through store-secret exchanges
    fn seed_words(&self) -> String;

    /// Wallet seed passphrase
    fn seed_passphrase(&self) -> String;
}
