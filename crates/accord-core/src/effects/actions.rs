//! Remote action capability
//!
//! Every remote operation the engine drives — registering identities and
//! accounts, downloading contracts and mailboxes, the peer-protocol
//! initiations — is one opaque action: construct it with typed parameters,
//! `run()` it to completion, then read the outcome through the accessors.
//! The engine never inspects message internals beyond what these traits
//! expose.
//!
//! Actions are synchronous from the caller's point of view: `run()` blocks
//! the calling worker until reply-or-timeout. Timeout policy belongs to the
//! implementation.

use crate::claims::ContractId;
use crate::peer::{ConnectionKind, SecretKind};
use crate::types::{AccountId, IdentityId, NotaryId, ReplyId, RequestId, UnitId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Outcome of one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The request was sent but no reply arrived before the timeout
    NoReply,
    /// The request could not be sent
    TransportError,
    /// A well-formed reply arrived
    ValidReply,
}

/// Decoded fields of a valid reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReply {
    /// Whether the counterparty reports success
    pub success: bool,
    /// Account identifier returned by account-registration actions
    pub account: Option<AccountId>,
}

/// Handle to one in-flight or completed remote action
#[async_trait]
pub trait NotaryAction: Send {
    /// Execute the action, blocking until reply-or-timeout
    async fn run(&mut self);

    /// Outcome of the most recent `run()`
    fn last_send_result(&self) -> SendOutcome;

    /// The decoded reply; present exactly when the last send result is
    /// [`SendOutcome::ValidReply`]
    fn reply(&self) -> Option<&ActionReply>;

    /// The peer request transmitted by this action, if it sent one
    fn sent_request_id(&self) -> Option<RequestId>;

    /// The peer reply transmitted by this action, if it sent one
    fn sent_reply_id(&self) -> Option<ReplyId>;
}

/// Boxed action handle
pub type BoxedAction = Box<dyn NotaryAction>;

/// Constructor per supported remote action kind
///
/// Constructors only build the handle; nothing is transmitted until the
/// handle is run. Implementations must be safe to call from any worker.
pub trait NotaryActions: Send + Sync {
    /// Register the local identity on a notary, optionally publishing its
    /// claim data
    fn register_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        publish_claims: bool,
    ) -> BoxedAction;

    /// Register an account against a unit definition
    fn register_account(&self, local: IdentityId, notary: NotaryId, unit: UnitId) -> BoxedAction;

    /// Download a contract definition
    fn download_contract(
        &self,
        local: IdentityId,
        notary: NotaryId,
        contract: ContractId,
    ) -> BoxedAction;

    /// Download a remote identity's credentials and claims
    fn download_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        target: IdentityId,
    ) -> BoxedAction;

    /// Download the current state of one account
    fn download_account(
        &self,
        local: IdentityId,
        notary: NotaryId,
        account: AccountId,
    ) -> BoxedAction;

    /// Download the local identity's mailbox on a notary
    fn download_mailbox(&self, local: IdentityId, notary: NotaryId) -> BoxedAction;

    /// Send a plain message to another identity
    fn send_message(
        &self,
        local: IdentityId,
        notary: NotaryId,
        recipient: IdentityId,
        body: &str,
    ) -> BoxedAction;

    /// Initiate a bailment request against one unit
    fn initiate_bailment(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        unit: UnitId,
    ) -> BoxedAction;

    /// Request connection credentials of the given kind
    fn request_connection_info(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        kind: ConnectionKind,
    ) -> BoxedAction;

    /// Ask the issuer to escrow a wallet secret
    fn initiate_store_secret(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        kind: SecretKind,
        primary: &str,
        secondary: &str,
    ) -> BoxedAction;

    /// Acknowledge a received notice (pending-bailment notification)
    fn acknowledge_notice(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        request: RequestId,
        ack: bool,
    ) -> BoxedAction;
}

/// Exclusive gate over the process-wide outbound session channel
///
/// Acquired for exactly the duration of one remote action so request and
/// reply framing of unrelated concurrent actions never interleave. Never
/// held across a wait for unrelated work.
#[derive(Debug, Clone)]
pub struct SessionGate {
    inner: Arc<Mutex<()>>,
}

impl SessionGate {
    /// Create a new gate
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire the gate, waiting behind any action currently on the wire
    pub async fn acquire(&self) -> SessionPermit {
        SessionPermit {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held while one remote action occupies the session channel
pub struct SessionPermit {
    _guard: OwnedMutexGuard<()>,
}
