//! Per-context operation queues
//!
//! Each (local identity, notary) context owns one [`OperationQueue`]: a
//! bundle of typed dedup queues, one per operation kind, plus the wakeup
//! signal its worker sleeps on. Producers push and wake; the worker drains
//! in a fixed order.

use accord_core::{AccountId, ContractId, DedupQueue, IdentityId, NotaryId, TaskId};
use std::fmt;
use tokio::sync::Notify;

/// Key identifying one registration relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId {
    /// The locally-controlled identity
    pub local: IdentityId,
    /// The notary the identity is (or will be) registered on
    pub notary: NotaryId,
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.local, self.notary)
    }
}

/// One queued outbound message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageTask {
    /// Recipient identity
    pub recipient: IdentityId,
    /// Message body
    pub body: String,
}

/// The operation queues of one context
///
/// Every queue is keyed by the operation's target, so duplicate schedule
/// calls collapse into one pending task. `register_identity` is keyed by the
/// publish flag: at most one pending registration per flavor.
pub struct OperationQueue {
    pub(crate) register_identity: DedupQueue<bool, TaskId>,
    pub(crate) check_identity: DedupQueue<IdentityId, TaskId>,
    pub(crate) download_contract: DedupQueue<ContractId, TaskId>,
    pub(crate) download_account: DedupQueue<AccountId, TaskId>,
    pub(crate) download_mailbox: DedupQueue<bool, TaskId>,
    pub(crate) send_message: DedupQueue<MessageTask, TaskId>,
    pub(crate) signal: Notify,
}

impl OperationQueue {
    pub(crate) fn new() -> Self {
        Self {
            register_identity: DedupQueue::new(),
            check_identity: DedupQueue::new(),
            download_contract: DedupQueue::new(),
            download_account: DedupQueue::new(),
            download_mailbox: DedupQueue::new(),
            send_message: DedupQueue::new(),
            signal: Notify::new(),
        }
    }

    /// Wake the context worker
    pub(crate) fn wake(&self) {
        self.signal.notify_one();
    }

    /// Whether every queue in the bundle is empty
    pub fn is_drained(&self) -> bool {
        self.register_identity.is_empty()
            && self.check_identity.is_empty()
            && self.download_contract.is_empty()
            && self.download_account.is_empty()
            && self.download_mailbox.is_empty()
            && self.send_message.is_empty()
    }
}
