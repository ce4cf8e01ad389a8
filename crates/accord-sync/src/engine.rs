//! Synchronization engine
//!
//! Keeps local mirrors of remote account, contract, and mailbox state fresh
//! by repeatedly issuing idempotent remote operations until they succeed.
//! Work arrives through the fire-and-forget `schedule_*` APIs, lands on the
//! owning context's [`OperationQueue`], and is drained by that context's
//! background worker (spawned on first use, reaped and respawned if it ever
//! finishes, never duplicated while live).
//!
//! Identities and notaries that are referenced before their records exist
//! locally go onto global missing queues, serviced through the configured
//! introduction notary.

use crate::queue::{ContextId, MessageTask, OperationQueue};
use crate::status::{TaskStatus, TaskStatusRegistry};
use crate::worker;
use accord_core::effects::{NotaryActions, SessionGate, WalletStore};
use accord_core::{AccountId, ContractId, DedupQueue, IdentityId, NotaryId, ShutdownToken, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Synchronization engine configuration
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Notary used to resolve identities and contracts that are not yet
    /// known locally. Without one, `find_identity` / `find_notary` park
    /// their targets until a notary is configured.
    pub introduction_notary: Option<NotaryId>,
}

pub(crate) struct ContextHandle {
    pub(crate) queue: Arc<OperationQueue>,
    pub(crate) worker: JoinHandle<()>,
}

/// The synchronization engine
///
/// Cheap to share: construct once with [`SyncEngine::new`] and clone the
/// `Arc`. All scheduling methods are fire-and-forget and idempotent — an
/// identical task already pending collapses into it and the call returns the
/// nil task ID.
pub struct SyncEngine {
    weak: Weak<SyncEngine>,
    wallet: Arc<dyn WalletStore>,
    actions: Arc<dyn NotaryActions>,
    gate: SessionGate,
    shutdown: ShutdownToken,
    statuses: Arc<TaskStatusRegistry>,
    refresh_counter: AtomicU64,
    contexts: Mutex<HashMap<ContextId, ContextHandle>>,
    pub(crate) missing_identities: DedupQueue<IdentityId, TaskId>,
    pub(crate) missing_notaries: DedupQueue<NotaryId, TaskId>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create the engine
    ///
    /// The status registry is injected so callers (and tests) can observe
    /// task lifecycles independently of the engine's own lifetime.
    pub fn new(
        wallet: Arc<dyn WalletStore>,
        actions: Arc<dyn NotaryActions>,
        gate: SessionGate,
        shutdown: ShutdownToken,
        statuses: Arc<TaskStatusRegistry>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            wallet,
            actions,
            gate,
            shutdown,
            statuses,
            refresh_counter: AtomicU64::new(0),
            contexts: Mutex::new(HashMap::new()),
            missing_identities: DedupQueue::new(),
            missing_notaries: DedupQueue::new(),
            config,
        })
    }

    pub(crate) fn wallet(&self) -> &Arc<dyn WalletStore> {
        &self.wallet
    }

    pub(crate) fn actions(&self) -> &Arc<dyn NotaryActions> {
        &self.actions
    }

    pub(crate) fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub(crate) fn token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    pub(crate) fn statuses(&self) -> &TaskStatusRegistry {
        &self.statuses
    }

    /// The configured introduction notary, if any
    pub fn introduction_notary(&self) -> Option<NotaryId> {
        self.config.introduction_notary
    }

    /// Monotonic count of refresh cycles since construction
    pub fn refresh_count(&self) -> u64 {
        self.refresh_counter.load(Ordering::Acquire)
    }

    /// Current status of a scheduled task
    pub fn task_status(&self, task: TaskId) -> Option<TaskStatus> {
        self.statuses.get(task)
    }

    /// Bump the refresh counter and queue a mailbox download plus account
    /// downloads for every registered context
    pub fn refresh(&self) {
        let count = self.refresh_counter.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(count, "sync refresh");

        for local in self.wallet.local_identities() {
            for notary in self.wallet.registrations(local) {
                self.schedule_download_mailbox(local, notary);
                for account in self.wallet.accounts(local, notary) {
                    self.schedule_download_account(local, notary, account);
                }
            }
        }
    }

    /// Queue a registration of the local identity on a notary
    ///
    /// `publish_claims` additionally publishes the identity's claim data as
    /// part of registration (used for trusted pairings).
    pub fn schedule_register_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        publish_claims: bool,
    ) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(&queue, |q| &q.register_identity, publish_claims)
    }

    /// Queue a credential/claims download for a remote identity
    pub fn schedule_check_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        target: IdentityId,
    ) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(&queue, |q| &q.check_identity, target)
    }

    /// Queue a contract download
    pub fn schedule_download_contract(
        &self,
        local: IdentityId,
        notary: NotaryId,
        contract: ContractId,
    ) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(&queue, |q| &q.download_contract, contract)
    }

    /// Queue an account state download
    pub fn schedule_download_account(
        &self,
        local: IdentityId,
        notary: NotaryId,
        account: AccountId,
    ) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(&queue, |q| &q.download_account, account)
    }

    /// Queue a mailbox download
    pub fn schedule_download_mailbox(&self, local: IdentityId, notary: NotaryId) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(&queue, |q| &q.download_mailbox, true)
    }

    /// Queue an outbound message
    pub fn message_identity(
        &self,
        local: IdentityId,
        notary: NotaryId,
        recipient: IdentityId,
        body: impl Into<String>,
    ) -> TaskId {
        let queue = self.ensure_context(ContextId { local, notary });
        self.submit(
            &queue,
            |q| &q.send_message,
            MessageTask {
                recipient,
                body: body.into(),
            },
        )
    }

    /// Request resolution of an identity that is not yet known locally
    ///
    /// Serviced by the introduction-notary context workers; safe to call
    /// repeatedly, duplicates collapse.
    pub fn find_identity(&self, target: IdentityId) -> TaskId {
        let task = TaskId::new();
        if !self.missing_identities.push(target, task) {
            return TaskId::nil();
        }
        self.statuses.set(task, TaskStatus::Started);
        self.wake_introduction_workers();
        task
    }

    /// Request resolution of a notary contract that is not yet known locally
    pub fn find_notary(&self, notary: NotaryId) -> TaskId {
        let task = TaskId::new();
        if !self.missing_notaries.push(notary, task) {
            return TaskId::nil();
        }
        self.statuses.set(task, TaskStatus::Started);
        self.wake_introduction_workers();
        task
    }

    /// Ensure the introduction-notary context for this identity is live
    ///
    /// Queues a mailbox download on it, which both spawns the worker and
    /// gives it an immediate pass over the missing queues.
    pub fn start_introduction_notary(&self, local: IdentityId) -> bool {
        match self.config.introduction_notary {
            Some(notary) => {
                self.schedule_download_mailbox(local, notary);
                true
            }
            None => {
                warn!("no introduction notary configured");
                false
            }
        }
    }

    /// Join every context worker; call after the shutdown token is tripped
    pub async fn shutdown(&self) {
        let handles: Vec<ContextHandle> = {
            let mut contexts = self.contexts.lock();
            contexts.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.queue.wake();
            let _ = handle.worker.await;
        }
    }

    /// Number of live context workers (finished workers are not counted)
    pub fn live_workers(&self) -> usize {
        self.contexts
            .lock()
            .values()
            .filter(|handle| !handle.worker.is_finished())
            .count()
    }

    fn submit<K>(
        &self,
        queue: &Arc<OperationQueue>,
        pick: impl Fn(&OperationQueue) -> &DedupQueue<K, TaskId>,
        key: K,
    ) -> TaskId
    where
        K: Eq + std::hash::Hash + Clone,
    {
        let task = TaskId::new();
        if !pick(queue).push(key, task) {
            return TaskId::nil();
        }
        self.statuses.set(task, TaskStatus::Started);
        queue.wake();
        task
    }

    /// Queue handle for a context, spawning its worker when needed
    ///
    /// At most one worker is live per context: an existing live worker is
    /// reused, a finished one is reaped and replaced.
    fn ensure_context(&self, ctx: ContextId) -> Arc<OperationQueue> {
        let engine = self
            .weak
            .upgrade()
            .expect("engine is alive while its methods run");
        let mut contexts = self.contexts.lock();

        if let Some(handle) = contexts.get_mut(&ctx) {
            if !handle.worker.is_finished() {
                return Arc::clone(&handle.queue);
            }
            debug!(%ctx, "reaping finished context worker");
            let queue = Arc::clone(&handle.queue);
            handle.worker = tokio::spawn(worker::context_worker(engine, ctx, Arc::clone(&queue)));
            return queue;
        }

        let queue = Arc::new(OperationQueue::new());
        let worker = tokio::spawn(worker::context_worker(engine, ctx, Arc::clone(&queue)));
        contexts.insert(
            ctx,
            ContextHandle {
                queue: Arc::clone(&queue),
                worker,
            },
        );
        queue
    }

    fn wake_introduction_workers(&self) {
        let Some(intro) = self.config.introduction_notary else {
            return;
        };
        for (ctx, handle) in self.contexts.lock().iter() {
            if ctx.notary == intro {
                handle.queue.wake();
            }
        }
    }
}
