//! Synchronization engine integration coverage
//!
//! Exercises the per-context worker machinery end to end against the
//! in-memory collaborators: dedup of pending operations, worker lifecycle,
//! status transitions, refresh fan-out, and the introduction-notary missing
//! queues.

use accord_core::effects::SessionGate;
use accord_core::{AccountId, IdentityId, NotaryId, ShutdownController, TaskId};
use accord_sync::{SyncConfig, SyncEngine, TaskStatus, TaskStatusRegistry};
use accord_testkit::{ActionKind, MemoryWallet, ScriptedNotary, ScriptedOutcome};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    wallet: Arc<MemoryWallet>,
    notary: Arc<ScriptedNotary>,
    statuses: Arc<TaskStatusRegistry>,
    controller: ShutdownController,
    gate: SessionGate,
    engine: Arc<SyncEngine>,
}

fn harness(config: SyncConfig) -> Harness {
    let wallet = Arc::new(MemoryWallet::new());
    let notary = Arc::new(ScriptedNotary::new());
    let statuses = Arc::new(TaskStatusRegistry::new());
    let controller = ShutdownController::new();
    let gate = SessionGate::new();
    let wallet_store: Arc<dyn accord_core::effects::WalletStore> = wallet.clone();
    let notary_actions: Arc<dyn accord_core::effects::NotaryActions> = notary.clone();
    let engine = SyncEngine::new(
        wallet_store,
        notary_actions,
        gate.clone(),
        controller.token(),
        Arc::clone(&statuses),
        config,
    );

    Harness {
        wallet,
        notary,
        statuses,
        controller,
        gate,
        engine,
    }
}

async fn wait_finished(engine: &SyncEngine, task: TaskId) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(TaskStatus::Finished(success)) = engine.task_status(task) {
                return success;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not finish in time")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

#[tokio::test(flavor = "multi_thread")]
async fn mailbox_download_runs_and_finishes() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());

    let task = h.engine.schedule_download_mailbox(local, notary_id);
    assert!(!task.is_nil());

    assert!(wait_finished(&h.engine, task).await);
    assert_eq!(h.notary.count(ActionKind::DownloadMailbox), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_duplicates_collapse() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());

    // Hold the session gate so the worker parks on the first task with the
    // second still queued.
    let permit = h.gate.acquire().await;

    let first = h.engine.schedule_download_mailbox(local, notary_id);
    assert!(!first.is_nil());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = h.engine.schedule_download_mailbox(local, notary_id);
    assert!(!second.is_nil());
    let third = h.engine.schedule_download_mailbox(local, notary_id);
    assert!(third.is_nil());

    drop(permit);
    assert!(wait_finished(&h.engine, first).await);
    assert!(wait_finished(&h.engine, second).await);
    assert_eq!(h.notary.count(ActionKind::DownloadMailbox), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn one_worker_per_context() {
    let h = harness(SyncConfig::default());
    let local = IdentityId::new();
    let notary_a = NotaryId::new();
    let notary_b = NotaryId::new();

    let t1 = h.engine.schedule_download_mailbox(local, notary_a);
    let t2 = h
        .engine
        .schedule_check_identity(local, notary_a, IdentityId::new());
    assert_eq!(h.engine.live_workers(), 1);

    let t3 = h.engine.schedule_download_mailbox(local, notary_b);
    assert_eq!(h.engine.live_workers(), 2);

    for task in [t1, t2, t3] {
        wait_finished(&h.engine, task).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn already_registered_identity_short_circuits() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());
    h.wallet.set_registered(local, notary_id, true);

    let task = h.engine.schedule_register_identity(local, notary_id, false);
    assert!(wait_finished(&h.engine, task).await);
    assert_eq!(h.notary.count(ActionKind::RegisterIdentity), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_action_finishes_as_failure() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());
    h.notary
        .script(ActionKind::DownloadMailbox, ScriptedOutcome::no_reply());

    let task = h.engine.schedule_download_mailbox(local, notary_id);
    assert!(!wait_finished(&h.engine, task).await);
    assert_eq!(h.notary.count(ActionKind::DownloadMailbox), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_fans_out_over_registered_contexts() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());
    h.wallet.set_registered(local, notary_id, true);
    h.wallet.add_known_account(local, notary_id, AccountId::new());

    assert_eq!(h.engine.refresh_count(), 0);
    h.engine.refresh();
    assert_eq!(h.engine.refresh_count(), 1);

    let notary = Arc::clone(&h.notary);
    wait_until(move || {
        notary.count(ActionKind::DownloadMailbox) == 1
            && notary.count(ActionKind::DownloadAccount) == 1
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_identities_resolve_through_introduction_notary() {
    let intro = NotaryId::new();
    let h = harness(SyncConfig {
        introduction_notary: Some(intro),
    });
    let local = IdentityId::new();
    let target = IdentityId::new();

    assert!(h.engine.start_introduction_notary(local));
    let task = h.engine.find_identity(target);
    assert!(!task.is_nil());

    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadIdentity) == 1).await;
    let call = h
        .notary
        .calls()
        .into_iter()
        .find(|c| c.kind == ActionKind::DownloadIdentity)
        .unwrap();
    assert_eq!(call.notary, intro);
    assert_eq!(call.target, Some(target));
}

#[tokio::test(flavor = "multi_thread")]
async fn find_identity_without_introduction_notary_parks() {
    let h = harness(SyncConfig::default());
    assert!(!h.engine.start_introduction_notary(IdentityId::new()));

    let task = h.engine.find_identity(IdentityId::new());
    assert!(!task.is_nil());
    assert_eq!(
        h.engine.task_status(task),
        Some(TaskStatus::Started),
        "no worker services the missing queue without an introduction notary"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_joins_every_worker() {
    let h = harness(SyncConfig::default());
    let (local, notary_id) = (IdentityId::new(), NotaryId::new());

    let task = h.engine.schedule_download_mailbox(local, notary_id);
    wait_finished(&h.engine, task).await;
    assert_eq!(h.engine.live_workers(), 1);

    h.controller.trip();
    h.engine.shutdown().await;
    assert_eq!(h.engine.live_workers(), 0);

    let _ = h.statuses.len();
}
