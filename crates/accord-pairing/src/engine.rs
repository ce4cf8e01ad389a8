//! Pairing engine
//!
//! Drives each (local identity, issuer identity) pair through discovery,
//! registration, and steady-state maintenance of its sub-protocols: secret
//! escrow, connection-info exchange, account registration, and bailment
//! top-up. One sweep advances every pair one step; the state machine is
//! re-entrant from the stored [`PairStatus`](crate::PairStatus), so a sweep
//! interrupted at any checkpoint resumes cleanly on the next one.
//!
//! All recoverable conditions are absorbed here: missing prerequisites queue
//! a background fetch and reset the pair to its retry marker, failed remote
//! actions leave no bookkeeping trace and re-run next sweep.

use crate::status::{PairKey, PairState, PairStatusBook};
use crate::supervisor;
use accord_core::effects::{NotaryAction, NotaryActions, SendOutcome, SessionGate, WalletStore};
use accord_core::{
    AccountId, ConnectionKind, ContractId, ContractOffering, DedupQueue, IdentityId, IssuerEditor,
    NotaryId, PeerRequestKind, RequestId, SecretKind, ShutdownToken, TaskId, UnitId,
    PAIRING_CONNECTION_KIND,
};
use accord_sync::SyncEngine;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Minimum number of unused bailment instructions kept on file per unit.
///
/// When the count drops below this, the steady-state loop requests more.
pub const MINIMUM_UNUSED_BAILMENTS: usize = 3;

/// Pairing engine configuration
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Cadence of the refresh poller
    pub refresh_interval: Duration,
    /// Grace period granted to an in-flight sweep during shutdown
    pub shutdown_grace: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(250),
        }
    }
}

/// The pairing engine
///
/// Construct with [`PairingEngine::start`], which spawns the refresh poller.
/// At most one pairing sweep is live at any time; sweep requests while one
/// is active are no-ops.
pub struct PairingEngine {
    pub(crate) weak: Weak<PairingEngine>,
    pub(crate) wallet: Arc<dyn WalletStore>,
    pub(crate) actions: Arc<dyn NotaryActions>,
    pub(crate) sync: Arc<SyncEngine>,
    pub(crate) gate: SessionGate,
    pub(crate) shutdown: ShutdownToken,
    pub(crate) status: Arc<PairStatusBook>,
    pub(crate) sweeping: Arc<AtomicBool>,
    pub(crate) sweep_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) poller_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) last_refresh: AtomicU64,
    pub(crate) dirty: DedupQueue<TaskId, bool>,
    pub(crate) dispatch_lock: tokio::sync::Mutex<()>,
    pub(crate) config: PairingConfig,
}

impl PairingEngine {
    /// Create the engine and start its refresh poller
    ///
    /// The status book is injected so callers and tests can observe pair
    /// states directly. The shutdown token is shared with the rest of the
    /// process; trip its controller before calling [`PairingEngine::shutdown`].
    pub fn start(
        wallet: Arc<dyn WalletStore>,
        actions: Arc<dyn NotaryActions>,
        sync: Arc<SyncEngine>,
        gate: SessionGate,
        shutdown: ShutdownToken,
        status: Arc<PairStatusBook>,
        config: PairingConfig,
    ) -> Arc<Self> {
        let engine = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            wallet,
            actions,
            sync,
            gate,
            shutdown,
            status,
            sweeping: Arc::new(AtomicBool::new(false)),
            sweep_handle: Mutex::new(None),
            poller_handle: Mutex::new(None),
            last_refresh: AtomicU64::new(0),
            dirty: DedupQueue::new(),
            dispatch_lock: tokio::sync::Mutex::new(()),
            config,
        });

        let poller = tokio::spawn(supervisor::refresh_poller(Arc::clone(&engine)));
        *engine.poller_handle.lock() = Some(poller);

        engine
    }

    /// Begin pairing with an issuer
    ///
    /// Both identifiers must be non-empty and the local identity must be
    /// under local control. The pairing code is stored only if the record
    /// does not already carry one. Returns whether the issuer was accepted;
    /// acceptance triggers a sweep.
    pub async fn add_issuer(
        &self,
        local: IdentityId,
        issuer: IdentityId,
        pairing_code: &str,
    ) -> bool {
        if local.is_nil() {
            error!("invalid local identity id");
            return false;
        }

        if !self.wallet.local_identities().contains(&local) {
            error!(%local, "identity is not locally controlled");
            return false;
        }

        if issuer.is_nil() {
            error!("invalid issuer identity id");
            return false;
        }

        let mut editor = match self.wallet.edit_issuer(local, issuer).await {
            Ok(editor) => editor,
            Err(err) => {
                error!(%err, "issuer record unavailable");
                return false;
            }
        };
        let need_pairing_code = editor.pairing_code().is_none();
        let have_pairing_code = !pairing_code.is_empty();

        if have_pairing_code && need_pairing_code {
            editor.set_pairing_code(pairing_code);
        }
        drop(editor);

        self.update();

        true
    }

    /// Issuers known for one local identity, optionally trusted-only
    ///
    /// An empty status book triggers a sweep so the caller converges on a
    /// populated answer.
    pub fn issuer_list(&self, local: IdentityId, only_trusted: bool) -> BTreeSet<IdentityId> {
        let snapshot = self.status.snapshot();

        if snapshot.is_empty() {
            self.update();
            return BTreeSet::new();
        }

        snapshot
            .into_iter()
            .filter(|(key, status)| key.local == local && (status.trusted || !only_trusted))
            .map(|(key, _)| key.issuer)
            .collect()
    }

    /// Serialized issuer record, if one exists
    pub async fn issuer_details(&self, local: IdentityId, issuer: IdentityId) -> Option<String> {
        let record = self.wallet.issuer(local, issuer).await?;
        match serde_json::to_string(&record) {
            Ok(details) => Some(details),
            Err(err) => {
                error!(%err, "failed to serialize issuer record");
                None
            }
        }
    }

    /// Request a refresh: the poller runs a sweep and a dispatch pass
    ///
    /// Duplicate requests collapse while one is pending.
    pub fn update(&self) {
        self.dirty.push(TaskId::nil(), true);
    }

    pub(crate) fn token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    pub(crate) fn issuer_map(&self) -> BTreeMap<IdentityId, BTreeSet<IdentityId>> {
        self.wallet
            .local_identities()
            .into_iter()
            .map(|local| (local, self.wallet.issuers(local)))
            .collect()
    }

    /// Advance one pair through the negotiation state machine
    pub(crate) async fn state_machine(&self, local: IdentityId, issuer: IdentityId) {
        debug!(%local, %issuer, "pairing state machine");
        let key = PairKey { local, issuer };
        let mut state = self.status.get(key).state;

        let claims = match self.wallet.identity_claims(issuer) {
            Some(claims) => claims,
            None => {
                info!(%issuer, "issuer identity not yet downloaded");
                self.queue_identity_download(local, issuer);
                self.status.set_state(key, PairState::Error);
                return;
            }
        };

        if self.shutdown.is_cancelled() {
            return;
        }

        let notary = match claims.preferred_notary {
            Some(notary) => notary,
            None => {
                info!(%issuer, "issuer does not advertise a notary");
                // Maybe there's a newer version of the identity record.
                self.queue_identity_download(local, issuer);
                self.status.set_state(key, PairState::Error);
                return;
            }
        };

        if self.shutdown.is_cancelled() {
            return;
        }

        if claims.offerings.is_empty() {
            info!(%issuer, "issuer does not advertise any contracts");
            self.queue_identity_download(local, issuer);
            self.status.set_state(key, PairState::Error);
            return;
        }

        let mut editor = match self.wallet.edit_issuer(local, issuer).await {
            Ok(editor) => editor,
            Err(err) => {
                error!(%err, "issuer record unavailable");
                self.status.set_state(key, PairState::Error);
                return;
            }
        };
        let trusted = editor.paired();
        self.status.set_trusted(key, trusted);

        if self.shutdown.is_cancelled() {
            return;
        }

        if state == PairState::Error {
            state = PairState::Started;
            self.status.set_state(key, state);
        }

        if state == PairState::Started {
            if !self.wallet.is_registered(local, notary) {
                info!(%local, %notary, "local identity not registered on issuer notary");

                if self.shutdown.is_cancelled() {
                    return;
                }

                if !self.wallet.has_notary_contract(notary) {
                    self.queue_notary_contract(local, notary);
                    return;
                }

                if self.shutdown.is_cancelled() {
                    return;
                }

                self.queue_registration(local, notary, trusted);
                return;
            }

            state = PairState::Registered;
            self.status.set_state(key, state);
        }

        if state == PairState::Registered {
            // Step 1: propagate the pairing secret and evaluate the escrow
            // precondition.
            let mut need_store_secret = false;
            if trusted {
                need_store_secret = !editor.request_complete(PeerRequestKind::StoreSecret)
                    && !editor.request_initiated(PeerRequestKind::StoreSecret);

                if let Some(code) = editor.pairing_code().map(str::to_owned) {
                    if let Err(err) = self.wallet.set_admin_secret(local, notary, &code).await {
                        error!(%err, "failed to store admin secret");
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                return;
            }

            // Step 2: secret escrow, once.
            if need_store_secret {
                info!(%issuer, "sending store-secret peer request");
                let (sent, request) = self.store_secret(local, issuer, notary).await;

                if sent {
                    editor.add_request(PeerRequestKind::StoreSecret, request);
                }
            }

            if self.shutdown.is_cancelled() {
                return;
            }

            // Step 3: connection info for the well-known kind, once.
            if trusted {
                let need_info = editor.connection_info(PAIRING_CONNECTION_KIND).is_none()
                    && !editor.connection_info_initiated(PAIRING_CONNECTION_KIND);

                if need_info {
                    info!(%issuer, "sending connection-info peer request");
                    let (sent, request) = self
                        .get_connection(local, issuer, notary, PAIRING_CONNECTION_KIND)
                        .await;

                    if sent {
                        editor.add_connection_request(request, PAIRING_CONNECTION_KIND);
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                return;
            }

            // Step 4: per advertised unit, register the account and keep
            // bailment instructions topped up.
            self.maintain_offerings(local, issuer, notary, &mut editor, &claims.offerings)
                .await;
        }
    }

    async fn maintain_offerings(
        &self,
        local: IdentityId,
        issuer: IdentityId,
        notary: NotaryId,
        editor: &mut IssuerEditor,
        offerings: &[ContractOffering],
    ) {
        for offering in offerings {
            if self.shutdown.is_cancelled() {
                return;
            }

            if editor.account_list(offering.kind, offering.unit).is_empty() {
                let (registered, account) =
                    self.register_account(local, notary, offering.unit).await;

                if !registered {
                    continue;
                }
                editor.add_account(offering.kind, offering.unit, account);
            }

            let instructions = editor.bailment_instructions(offering.unit);
            let need_bailment = instructions.len() < MINIMUM_UNUSED_BAILMENTS;
            let none_pending = !editor.bailment_initiated(offering.unit);

            if need_bailment && none_pending {
                info!(unit = %offering.unit, "requesting bailment instructions");
                let (sent, request) = self
                    .initiate_bailment(local, notary, issuer, offering.unit)
                    .await;

                if sent {
                    editor.add_unit_request(PeerRequestKind::Bailment, request, offering.unit);
                }
            }
        }
    }

    /// Initiate secret escrow with the issuer
    async fn store_secret(
        &self,
        local: IdentityId,
        issuer: IdentityId,
        notary: NotaryId,
    ) -> (bool, RequestId) {
        let words = self.wallet.seed_words();
        let passphrase = self.wallet.seed_passphrase();

        let permit = self.gate.acquire().await;
        let mut action = self.actions.initiate_store_secret(
            local,
            notary,
            issuer,
            SecretKind::Bip39,
            &words,
            &passphrase,
        );
        action.run().await;
        drop(permit);

        request_outcome(&*action)
    }

    /// Request connection credentials of one kind from the issuer
    async fn get_connection(
        &self,
        local: IdentityId,
        issuer: IdentityId,
        notary: NotaryId,
        kind: ConnectionKind,
    ) -> (bool, RequestId) {
        let permit = self.gate.acquire().await;
        let mut action = self
            .actions
            .request_connection_info(local, notary, issuer, kind);
        action.run().await;
        drop(permit);

        request_outcome(&*action)
    }

    /// Initiate a bailment request for one unit
    ///
    /// Requires the unit contract locally; queues its download and defers
    /// otherwise.
    async fn initiate_bailment(
        &self,
        local: IdentityId,
        notary: NotaryId,
        issuer: IdentityId,
        unit: UnitId,
    ) -> (bool, RequestId) {
        if !self.wallet.has_unit_contract(unit) {
            self.queue_unit_contract(local, notary, unit);
            return (false, RequestId::nil());
        }

        let permit = self.gate.acquire().await;
        let mut action = self.actions.initiate_bailment(local, notary, issuer, unit);
        action.run().await;
        drop(permit);

        request_outcome(&*action)
    }

    /// Register an account against one unit
    ///
    /// Requires the unit contract locally; queues its download and defers
    /// otherwise.
    async fn register_account(
        &self,
        local: IdentityId,
        notary: NotaryId,
        unit: UnitId,
    ) -> (bool, AccountId) {
        if !self.wallet.has_unit_contract(unit) {
            self.queue_unit_contract(local, notary, unit);
            return (false, AccountId::nil());
        }

        let permit = self.gate.acquire().await;
        let mut action = self.actions.register_account(local, notary, unit);
        action.run().await;
        drop(permit);

        if action.last_send_result() != SendOutcome::ValidReply {
            warn!(%unit, "account registration got no valid reply");
            return (false, AccountId::nil());
        }

        let reply = action
            .reply()
            .expect("action reported a valid reply but exposes none");

        if !reply.success {
            return (false, AccountId::nil());
        }

        let account = reply
            .account
            .expect("successful registration reply carries no account id");
        (true, account)
    }

    fn queue_identity_download(&self, local: IdentityId, issuer: IdentityId) {
        self.sync.start_introduction_notary(local);
        self.sync.find_identity(issuer);
    }

    fn queue_notary_contract(&self, local: IdentityId, notary: NotaryId) {
        self.sync.start_introduction_notary(local);
        self.sync.find_notary(notary);
    }

    fn queue_unit_contract(&self, local: IdentityId, notary: NotaryId, unit: UnitId) {
        self.sync
            .schedule_download_contract(local, notary, ContractId::Unit(unit));
    }

    fn queue_registration(&self, local: IdentityId, notary: NotaryId, publish_claims: bool) {
        self.sync
            .schedule_register_identity(local, notary, publish_claims);
    }
}

/// Shared tail of the request-initiating helpers: success flag plus the
/// transmitted request's ID.
fn request_outcome(action: &dyn NotaryAction) -> (bool, RequestId) {
    if action.last_send_result() != SendOutcome::ValidReply {
        return (false, RequestId::nil());
    }

    let reply = action
        .reply()
        .expect("action reported a valid reply but exposes none");
    let request = action
        .sent_request_id()
        .expect("action reported a valid reply but sent no peer request");

    (reply.success, request)
}
