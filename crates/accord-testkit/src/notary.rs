//! Scriptable remote action capability
//!
//! A [`NotaryActions`] implementation that records every action the engines
//! run and returns programmed outcomes. Outcomes are scripted per action
//! kind as a queue of one-shot results; anything unscripted falls back to
//! the default outcome (a successful valid reply).

use accord_core::effects::{
    ActionReply, BoxedAction, NotaryAction, NotaryActions, SendOutcome,
};
use accord_core::{
    AccountId, ConnectionKind, ContractId, IdentityId, NotaryId, ReplyId, RequestId, SecretKind,
    UnitId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Kind tag of one recorded action invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Identity registration on a notary
    RegisterIdentity,
    /// Account registration against a unit
    RegisterAccount,
    /// Contract download
    DownloadContract,
    /// Remote identity download
    DownloadIdentity,
    /// Account state download
    DownloadAccount,
    /// Mailbox download
    DownloadMailbox,
    /// Plain message send
    SendMessage,
    /// Bailment initiation
    InitiateBailment,
    /// Connection-info request
    RequestConnectionInfo,
    /// Store-secret initiation
    InitiateStoreSecret,
    /// Notice acknowledgement
    AcknowledgeNotice,
}

/// One recorded action invocation
#[derive(Debug, Clone)]
pub struct ActionCall {
    /// Which action ran
    pub kind: ActionKind,
    /// Local identity parameter
    pub local: IdentityId,
    /// Notary parameter
    pub notary: NotaryId,
    /// Target identity, for actions that address one
    pub target: Option<IdentityId>,
    /// Unit, for actions scoped to a unit definition
    pub unit: Option<UnitId>,
}

/// Programmed outcome for one action execution
#[derive(Debug, Clone)]
pub struct ScriptedOutcome {
    /// Send result the action reports
    pub send: SendOutcome,
    /// Success flag carried by the reply (when one exists)
    pub success: bool,
    /// Account ID carried by the reply, for registration actions
    pub account: Option<AccountId>,
}

impl ScriptedOutcome {
    /// A successful valid reply
    pub fn success() -> Self {
        Self {
            send: SendOutcome::ValidReply,
            success: true,
            account: None,
        }
    }

    /// A valid reply with the success flag cleared
    pub fn failure() -> Self {
        Self {
            send: SendOutcome::ValidReply,
            success: false,
            account: None,
        }
    }

    /// No reply before the timeout
    pub fn no_reply() -> Self {
        Self {
            send: SendOutcome::NoReply,
            success: false,
            account: None,
        }
    }

    /// A successful valid reply carrying this account ID
    pub fn with_account(account: AccountId) -> Self {
        Self {
            send: SendOutcome::ValidReply,
            success: true,
            account: Some(account),
        }
    }
}

type Hook = Arc<dyn Fn(&ActionCall) + Send + Sync>;

/// Scriptable [`NotaryActions`] implementation
#[derive(Default)]
pub struct ScriptedNotary {
    log: Arc<Mutex<Vec<ActionCall>>>,
    scripts: Mutex<HashMap<ActionKind, VecDeque<ScriptedOutcome>>>,
    default_outcome: Mutex<Option<ScriptedOutcome>>,
    hook: Mutex<Option<Hook>>,
}

impl ScriptedNotary {
    /// Create a notary whose every action succeeds by default
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot outcome for the next execution of this kind
    pub fn script(&self, kind: ActionKind, outcome: ScriptedOutcome) {
        self.scripts.lock().entry(kind).or_default().push_back(outcome);
    }

    /// Replace the fallback outcome for unscripted executions
    pub fn set_default(&self, outcome: ScriptedOutcome) {
        *self.default_outcome.lock() = Some(outcome);
    }

    /// Install a hook invoked at the start of every action execution
    ///
    /// Useful for tripping a shutdown controller at a precise point in a
    /// sweep.
    pub fn set_hook(&self, hook: impl Fn(&ActionCall) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    /// Every action executed so far, in execution order
    pub fn calls(&self) -> Vec<ActionCall> {
        self.log.lock().clone()
    }

    /// Number of executed actions of this kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.log.lock().iter().filter(|c| c.kind == kind).count()
    }

    fn build(&self, call: ActionCall) -> BoxedAction {
        let outcome = self
            .scripts
            .lock()
            .get_mut(&call.kind)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.default_outcome.lock().clone())
            .unwrap_or_else(ScriptedOutcome::success);

        // Registration replies always carry an account ID.
        let outcome = if call.kind == ActionKind::RegisterAccount
            && outcome.send == SendOutcome::ValidReply
            && outcome.success
            && outcome.account.is_none()
        {
            ScriptedOutcome {
                account: Some(AccountId::new()),
                ..outcome
            }
        } else {
            outcome
        };

        Box::new(ScriptedAction {
            call,
            outcome,
            log: Arc::clone(&self.log),
            hook: self.hook.lock().clone(),
            ran: false,
            request_id: RequestId::new(),
            reply_id: ReplyId::new(),
            reply: None,
        })
    }
}

struct ScriptedAction {
    call: ActionCall,
    outcome: ScriptedOutcome,
    log: Arc<Mutex<Vec<ActionCall>>>,
    hook: Option<Hook>,
    ran: bool,
    request_id: RequestId,
    reply_id: ReplyId,
    reply: Option<ActionReply>,
}

#[async_trait]
impl NotaryAction for ScriptedAction {
    async fn run(&mut self) {
        if let Some(hook) = &self.hook {
            hook(&self.call);
        }
        self.log.lock().push(self.call.clone());
        self.ran = true;
        if self.outcome.send == SendOutcome::ValidReply {
            self.reply = Some(ActionReply {
                success: self.outcome.success,
                account: self.outcome.account,
            });
        }
    }

    fn last_send_result(&self) -> SendOutcome {
        if !self.ran {
            return SendOutcome::TransportError;
        }
        self.outcome.send
    }

    fn reply(&self) -> Option<&ActionReply> {
        self.reply.as_ref()
    }

    fn sent_request_id(&self) -> Option<RequestId> {
        (self.ran && self.outcome.send != SendOutcome::TransportError).then_some(self.request_id)
    }

    fn sent_reply_id(&self) -> Option<ReplyId> {
        (self.ran && self.outcome.send != SendOutcome::TransportError).then_some(self.reply_id)
    }
}

impl NotaryActions for ScriptedNotary {
    fn register_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        _publish_claims: bool,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::RegisterIdentity,
            local,
            notary,
            target: None,
            unit: None,
        })
    }

    fn register_account(&self, local: IdentityId, notary: NotaryId, unit: UnitId) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::RegisterAccount,
            local,
            notary,
            target: None,
            unit: Some(unit),
        })
    }

    fn download_contract(
        &self,
        local: IdentityId,
        notary: NotaryId,
        contract: ContractId,
    ) -> BoxedAction {
        let unit = match contract {
            ContractId::Unit(unit) => Some(unit),
            ContractId::Notary(_) => None,
        };
        self.build(ActionCall {
            kind: ActionKind::DownloadContract,
            local,
            notary,
            target: None,
            unit,
        })
    }

    fn download_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        target: IdentityId,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::DownloadIdentity,
            local,
            notary,
            target: Some(target),
            unit: None,
        })
    }

    fn download_account(
        &self,
        local: IdentityId,
        notary: NotaryId,
        _account: AccountId,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::DownloadAccount,
            local,
            notary,
            target: None,
            unit: None,
        })
    }

    fn download_mailbox(&self, local: IdentityId, notary: NotaryId) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::DownloadMailbox,
            local,
            notary,
            target: None,
            unit: None,
        })
    }

    fn send_message(
        &self,
        local: IdentityId,
        notary: NotaryId,
        recipient: IdentityId,
        _body: &str,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::SendMessage,
            local,
            notary,
            target: Some(recipient),
            unit: None,
        })
    }

    fn initiate_bailment(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        unit: UnitId,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::InitiateBailment,
            local,
            notary,
            target: Some(issuer),
            unit: Some(unit),
        })
    }

    fn request_connection_info(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        _kind: ConnectionKind,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::RequestConnectionInfo,
            local,
            notary,
            target: Some(issuer),
            unit: None,
        })
    }

    fn initiate_store_secret(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        _kind: SecretKind,
        _primary: &str,
        _secondary: &str,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::InitiateStoreSecret,
            local,
            notary,
            target: Some(issuer),
            unit: None,
        })
    }

    fn acknowledge_notice(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        _request: RequestId,
        _ack: bool,
    ) -> BoxedAction {
        self.build(ActionCall {
            kind: ActionKind::AcknowledgeNotice,
            local,
            notary,
            target: Some(issuer),
            unit: None,
        })
    }
}
