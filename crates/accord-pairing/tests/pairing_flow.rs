//! Pairing engine end-to-end coverage
//!
//! Drives the full stack — pairing engine, sync engine, in-memory wallet,
//! scripted notary — through the negotiation scenarios: validation,
//! deferred-progress retries, registration, steady-state maintenance,
//! duplicate correlation, cancellation, and supervision.

use accord_core::effects::{SessionGate, WalletStore};
use accord_core::{
    ContractOffering, IdentityClaims, IdentityId, NotaryId, PeerReply, PeerRequest,
    PeerRequestKind, ReplyId, RequestId, ShutdownController, UnitId, UnitKind,
};
use accord_pairing::{PairKey, PairState, PairStatusBook, PairingConfig, PairingEngine};
use accord_sync::{SyncConfig, SyncEngine, TaskStatusRegistry};
use accord_testkit::{ActionKind, MemoryWallet, ScriptedNotary};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    wallet: Arc<MemoryWallet>,
    notary: Arc<ScriptedNotary>,
    book: Arc<PairStatusBook>,
    controller: Arc<ShutdownController>,
    sync: Arc<SyncEngine>,
    engine: Arc<PairingEngine>,
    intro: NotaryId,
}

/// Poller effectively disabled; tests drive sweeps explicitly.
fn manual_config() -> PairingConfig {
    PairingConfig {
        refresh_interval: Duration::from_secs(3600),
        shutdown_grace: Duration::from_millis(50),
    }
}

fn build_engine(
    wallet: &Arc<MemoryWallet>,
    notary: &Arc<ScriptedNotary>,
    book: &Arc<PairStatusBook>,
    intro: NotaryId,
    config: PairingConfig,
) -> (Arc<ShutdownController>, Arc<SyncEngine>, Arc<PairingEngine>) {
    let controller = Arc::new(ShutdownController::new());
    let gate = SessionGate::new();
    let statuses = Arc::new(TaskStatusRegistry::new());

    let wallet_store: Arc<dyn accord_core::effects::WalletStore> = wallet.clone();
    let notary_actions: Arc<dyn accord_core::effects::NotaryActions> = notary.clone();

    let sync = SyncEngine::new(
        Arc::clone(&wallet_store),
        Arc::clone(&notary_actions),
        gate.clone(),
        controller.token(),
        statuses,
        SyncConfig {
            introduction_notary: Some(intro),
        },
    );

    let engine = PairingEngine::start(
        wallet_store,
        notary_actions,
        Arc::clone(&sync),
        gate,
        controller.token(),
        Arc::clone(book),
        config,
    );

    (controller, sync, engine)
}

fn harness(config: PairingConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let wallet = Arc::new(MemoryWallet::new());
    let notary = Arc::new(ScriptedNotary::new());
    let book = Arc::new(PairStatusBook::new());
    let intro = NotaryId::new();
    let (controller, sync, engine) = build_engine(&wallet, &notary, &book, intro, config);

    Harness {
        wallet,
        notary,
        book,
        controller,
        sync,
        engine,
        intro,
    }
}

fn advertise(h: &Harness, issuer: IdentityId, notary: NotaryId, units: &[UnitId]) {
    h.wallet.set_claims(
        issuer,
        IdentityClaims {
            preferred_notary: Some(notary),
            offerings: units
                .iter()
                .map(|unit| ContractOffering {
                    kind: UnitKind::Currency,
                    unit: *unit,
                })
                .collect(),
        },
    );
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
async fn add_issuer_validates_its_inputs() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    h.wallet.add_local_identity(alice);

    assert!(!h.engine.add_issuer(IdentityId::nil(), issuer, "code").await);
    assert!(!h.engine.add_issuer(alice, IdentityId::nil(), "code").await);

    // Known format, but not locally controlled.
    let mallory = IdentityId::new();
    assert!(!h.engine.add_issuer(mallory, issuer, "code").await);
    assert!(!h.wallet.has_issuer_record(mallory, issuer));

    // Accepted without a pairing code; none is invented.
    assert!(h.engine.add_issuer(alice, issuer, "").await);
    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert_eq!(record.pairing_code(), None);

    // First real code sticks, later codes are ignored.
    assert!(h.engine.add_issuer(alice, issuer, "secret").await);
    assert!(h.engine.add_issuer(alice, issuer, "other").await);
    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert_eq!(record.pairing_code(), Some("secret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolved_issuer_resets_to_error_and_fetches_once_per_sweep() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    h.wallet.add_local_identity(alice);
    assert!(h.engine.add_issuer(alice, issuer, "").await);

    assert!(h.engine.sweep_once().await);
    let key = PairKey {
        local: alice,
        issuer,
    };
    assert_eq!(h.book.get(key).state, PairState::Error);

    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadIdentity) == 1).await;
    let call = h
        .notary
        .calls()
        .into_iter()
        .find(|c| c.kind == ActionKind::DownloadIdentity)
        .unwrap();
    assert_eq!(call.notary, h.intro);
    assert_eq!(call.target, Some(issuer));

    // Still unresolved: the next sweep schedules exactly one more fetch.
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.book.get(key).state, PairState::Error);
    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadIdentity) == 2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn registration_advances_through_contract_and_register_steps() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    h.wallet.add_local_identity(alice);
    advertise(&h, issuer, notary_id, &[unit]);
    assert!(h.engine.add_issuer(alice, issuer, "").await);

    let key = PairKey {
        local: alice,
        issuer,
    };

    // Sweep 1: notary contract unknown, queue its fetch and hold position.
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.book.get(key).state, PairState::Started);
    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadContract) == 1).await;
    assert_eq!(h.notary.count(ActionKind::RegisterIdentity), 0);

    // Sweep 2: contract known, queue registration.
    h.wallet.add_notary_contract(notary_id);
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.book.get(key).state, PairState::Started);
    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::RegisterIdentity) == 1).await;

    // Sweep 3: registered, enter steady state and maintain the offering.
    h.wallet.set_registered(alice, notary_id, true);
    h.wallet.add_unit_contract(unit);
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.book.get(key).state, PairState::Registered);
    assert_eq!(h.notary.count(ActionKind::RegisterAccount), 1);
    assert_eq!(h.notary.count(ActionKind::InitiateBailment), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn two_units_register_exactly_two_accounts_then_hold() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let (unit_a, unit_b) = (UnitId::new(), UnitId::new());
    h.wallet.add_local_identity(alice);
    h.wallet.add_notary_contract(notary_id);
    h.wallet.add_unit_contract(unit_a);
    h.wallet.add_unit_contract(unit_b);
    h.wallet.set_registered(alice, notary_id, true);
    advertise(&h, issuer, notary_id, &[unit_a, unit_b]);
    assert!(h.engine.add_issuer(alice, issuer, "").await);

    assert!(h.engine.sweep_once().await);
    assert_eq!(h.notary.count(ActionKind::RegisterAccount), 2);
    assert_eq!(h.notary.count(ActionKind::InitiateBailment), 2);

    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert_eq!(record.account_list(UnitKind::Currency, unit_a).len(), 1);
    assert_eq!(record.account_list(UnitKind::Currency, unit_b).len(), 1);
    assert!(record.bailment_initiated(unit_a));
    assert!(record.bailment_initiated(unit_b));

    // Steady state: re-running the sweep issues nothing new.
    let before = h.notary.calls().len();
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.notary.calls().len(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn trusted_pairing_runs_escrow_and_connection_info_once() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    h.wallet.add_local_identity(alice);
    h.wallet.add_notary_contract(notary_id);
    h.wallet.add_unit_contract(unit);
    h.wallet.set_registered(alice, notary_id, true);
    advertise(&h, issuer, notary_id, &[unit]);
    assert!(h.engine.add_issuer(alice, issuer, "sekrit").await);

    {
        let mut editor = h.wallet.edit_issuer(alice, issuer).await.unwrap();
        editor.set_paired(true);
    }

    assert!(h.engine.sweep_once().await);

    let key = PairKey {
        local: alice,
        issuer,
    };
    assert!(h.book.get(key).trusted);
    assert_eq!(h.wallet.admin_secret(alice, notary_id), Some("sekrit".into()));
    assert_eq!(h.notary.count(ActionKind::InitiateStoreSecret), 1);
    assert_eq!(h.notary.count(ActionKind::RequestConnectionInfo), 1);
    assert_eq!(h.notary.count(ActionKind::RegisterAccount), 1);
    assert_eq!(h.notary.count(ActionKind::InitiateBailment), 1);

    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert!(record.request_initiated(PeerRequestKind::StoreSecret));
    assert!(record.connection_info_initiated(accord_core::PAIRING_CONNECTION_KIND));

    // Every sub-protocol is pending; a re-run issues zero further actions.
    let before = h.notary.calls().len();
    assert!(h.engine.sweep_once().await);
    assert_eq!(h.notary.calls().len(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_reply_correlation_mutates_once() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    h.wallet.add_local_identity(alice);

    let request = RequestId::new();
    {
        let mut editor = h.wallet.edit_issuer(alice, issuer).await.unwrap();
        editor.add_request(PeerRequestKind::StoreSecret, request);
    }

    let reply_id = ReplyId::new();
    h.wallet.deliver_reply(
        alice,
        PeerReply {
            id: reply_id,
            kind: PeerRequestKind::StoreSecret,
            initiator: alice,
            recipient: issuer,
            request,
            success: true,
        },
    );

    h.engine.dispatch_once().await;
    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert!(record.request_complete(PeerRequestKind::StoreSecret));
    assert_eq!(h.wallet.completed_requests(), vec![(alice, reply_id)]);

    // The mailbox still holds the reply; a second pass is a no-op.
    h.engine.dispatch_once().await;
    assert_eq!(h.wallet.completed_requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_bailment_notification_is_acknowledged_once() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    h.wallet.add_local_identity(alice);

    // One unused bailment instruction on file.
    let original = RequestId::new();
    {
        let mut editor = h.wallet.edit_issuer(alice, issuer).await.unwrap();
        editor.add_unit_request(PeerRequestKind::Bailment, original, unit);
        editor.add_reply(PeerRequestKind::Bailment, original, ReplyId::new());
    }

    let notice = RequestId::new();
    h.wallet.deliver_request(
        alice,
        PeerRequest {
            id: notice,
            kind: PeerRequestKind::PendingBailment,
            initiator: issuer,
            recipient: alice,
            notary: notary_id,
            reference: Some(original),
        },
    );

    h.engine.dispatch_once().await;

    let record = h.wallet.issuer(alice, issuer).await.unwrap();
    assert!(record.bailment_instructions(unit).is_empty(), "instruction consumed");
    assert!(record.request_complete(PeerRequestKind::PendingBailment));
    assert_eq!(h.notary.count(ActionKind::AcknowledgeNotice), 1);
    let call = h
        .notary
        .calls()
        .into_iter()
        .find(|c| c.kind == ActionKind::AcknowledgeNotice)
        .unwrap();
    assert_eq!(call.notary, notary_id);
    assert_eq!(call.target, Some(issuer));

    // Redelivery of the same notification changes nothing.
    h.engine.dispatch_once().await;
    assert_eq!(h.notary.count(ActionKind::AcknowledgeNotice), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_after_escrow_skips_later_steps_and_resumes() {
    let wallet = Arc::new(MemoryWallet::new());
    let notary = Arc::new(ScriptedNotary::new());
    let book = Arc::new(PairStatusBook::new());
    let intro = NotaryId::new();
    let (controller, _sync, engine) =
        build_engine(&wallet, &notary, &book, intro, manual_config());

    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    wallet.add_local_identity(alice);
    wallet.add_notary_contract(notary_id);
    wallet.add_unit_contract(unit);
    wallet.set_registered(alice, notary_id, true);
    wallet.set_claims(
        issuer,
        IdentityClaims {
            preferred_notary: Some(notary_id),
            offerings: vec![ContractOffering {
                kind: UnitKind::Currency,
                unit,
            }],
        },
    );
    assert!(engine.add_issuer(alice, issuer, "sekrit").await);
    {
        let mut editor = wallet.edit_issuer(alice, issuer).await.unwrap();
        editor.set_paired(true);
    }

    // Trip the shutdown signal from inside the store-secret action: the
    // checkpoint after step 2 must stop the sweep.
    let trip = Arc::clone(&controller);
    notary.set_hook(move |call| {
        if call.kind == ActionKind::InitiateStoreSecret {
            trip.trip();
        }
    });

    assert!(engine.sweep_once().await);
    assert_eq!(notary.count(ActionKind::InitiateStoreSecret), 1);
    assert_eq!(notary.count(ActionKind::RequestConnectionInfo), 0);
    assert_eq!(notary.count(ActionKind::RegisterAccount), 0);

    // The committed sub-step survives the cancellation.
    let record = wallet.issuer(alice, issuer).await.unwrap();
    assert!(record.request_initiated(PeerRequestKind::StoreSecret));

    engine.shutdown().await;

    // A fresh engine over the same wallet and status book resumes: escrow is
    // already initiated, the remaining steps run idempotently.
    let (_controller2, _sync2, engine2) =
        build_engine(&wallet, &notary, &book, intro, manual_config());
    assert!(engine2.sweep_once().await);
    assert_eq!(notary.count(ActionKind::InitiateStoreSecret), 1);
    assert_eq!(notary.count(ActionKind::RequestConnectionInfo), 1);
    assert_eq!(notary.count(ActionKind::RegisterAccount), 1);
    assert_eq!(notary.count(ActionKind::InitiateBailment), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn issuer_list_and_details_converge() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    h.wallet.add_local_identity(alice);
    advertise(&h, issuer, notary_id, &[unit]);
    assert!(h.engine.add_issuer(alice, issuer, "sekrit").await);

    // Empty status book: nothing to report yet.
    assert!(h.engine.issuer_list(alice, false).is_empty());

    assert!(h.engine.sweep_once().await);
    let list = h.engine.issuer_list(alice, false);
    assert!(list.contains(&issuer));
    assert!(h.engine.issuer_list(alice, true).is_empty(), "untrusted");

    {
        let mut editor = h.wallet.edit_issuer(alice, issuer).await.unwrap();
        editor.set_paired(true);
    }
    assert!(h.engine.sweep_once().await);
    assert!(h.engine.issuer_list(alice, true).contains(&issuer));

    // Another local identity sees nothing.
    let bob = IdentityId::new();
    assert!(h.engine.issuer_list(bob, false).is_empty());

    let details = h.engine.issuer_details(alice, issuer).await.unwrap();
    assert!(details.contains("pairing_code"));
    assert!(h
        .engine
        .issuer_details(alice, IdentityId::new())
        .await
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn at_most_one_sweep_is_live() {
    let h = harness(manual_config());
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    let notary_id = NotaryId::new();
    let unit = UnitId::new();
    h.wallet.add_local_identity(alice);
    h.wallet.add_notary_contract(notary_id);
    h.wallet.add_unit_contract(unit);
    h.wallet.set_registered(alice, notary_id, true);
    advertise(&h, issuer, notary_id, &[unit]);
    assert!(h.engine.add_issuer(alice, issuer, "").await);

    // Stall the sweep inside its first remote action.
    h.notary.set_hook(|call| {
        if call.kind == ActionKind::RegisterAccount {
            std::thread::sleep(Duration::from_millis(400));
        }
    });

    let engine = Arc::clone(&h.engine);
    let running = tokio::spawn(async move { engine.sweep_once().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!h.engine.sweep_once().await, "second sweep must be refused");
    assert!(running.await.unwrap());

    // Once the first sweep finished, sweeping is available again.
    assert!(h.engine.sweep_once().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn poller_reacts_to_update_and_refresh_counter() {
    let h = harness(PairingConfig {
        refresh_interval: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(50),
    });
    let alice = IdentityId::new();
    let issuer = IdentityId::new();
    h.wallet.add_local_identity(alice);

    // add_issuer signals the dirty queue; the poller picks it up and sweeps.
    assert!(h.engine.add_issuer(alice, issuer, "").await);
    let book = Arc::clone(&h.book);
    wait_until(move || !book.is_empty()).await;
    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadIdentity) >= 1).await;

    // A remote-change counter bump triggers another refresh.
    h.sync.refresh();
    let notary = Arc::clone(&h.notary);
    wait_until(move || notary.count(ActionKind::DownloadIdentity) >= 2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_joins_poller_and_sweep() {
    let h = harness(manual_config());
    h.controller.trip();

    tokio::time::timeout(Duration::from_secs(5), async {
        h.engine.shutdown().await;
        h.sync.shutdown().await;
    })
    .await
    .expect("shutdown did not complete");
}
