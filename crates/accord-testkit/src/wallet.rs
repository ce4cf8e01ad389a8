//! In-memory wallet store
//!
//! A [`WalletStore`] backed by plain maps, with setup helpers for seeding
//! identities, claims, contracts, registrations, and mailbox traffic, plus
//! accessors for asserting on what the engines wrote back.

use accord_core::effects::WalletStore;
use accord_core::{
    AccordResult, AccountId, IdentityClaims, IdentityId, IssuerEditor, IssuerRecord, NotaryId,
    PeerReply, PeerRequest, ReplyId, RequestId, UnitId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct State {
    locals: BTreeSet<IdentityId>,
    issuers: HashMap<IdentityId, BTreeSet<IdentityId>>,
    claims: HashMap<IdentityId, IdentityClaims>,
    notary_contracts: HashSet<NotaryId>,
    unit_contracts: HashSet<UnitId>,
    registered: HashSet<(IdentityId, NotaryId)>,
    admin_secrets: HashMap<(IdentityId, NotaryId), String>,
    accounts: HashMap<(IdentityId, NotaryId), Vec<AccountId>>,
    replies: HashMap<IdentityId, Vec<PeerReply>>,
    requests: HashMap<IdentityId, Vec<PeerRequest>>,
    completed: Vec<(IdentityId, ReplyId)>,
}

type RecordMap = HashMap<(IdentityId, IdentityId), Arc<tokio::sync::Mutex<IssuerRecord>>>;

/// In-memory [`WalletStore`] for tests
#[derive(Default)]
pub struct MemoryWallet {
    state: Mutex<State>,
    records: Mutex<RecordMap>,
    seed_words: String,
    seed_passphrase: String,
}

impl MemoryWallet {
    /// Create an empty wallet with placeholder seed material
    pub fn new() -> Self {
        Self {
            seed_words: "abandon ability able about above absent".into(),
            seed_passphrase: "passphrase".into(),
            ..Self::default()
        }
    }

    /// Register a locally-controlled identity
    pub fn add_local_identity(&self, id: IdentityId) {
        self.state.lock().locals.insert(id);
    }

    /// Seed claim metadata for an identity
    pub fn set_claims(&self, id: IdentityId, claims: IdentityClaims) {
        self.state.lock().claims.insert(id, claims);
    }

    /// Remove claim metadata for an identity
    pub fn clear_claims(&self, id: IdentityId) {
        self.state.lock().claims.remove(&id);
    }

    /// Mark a notary contract as locally known
    pub fn add_notary_contract(&self, id: NotaryId) {
        self.state.lock().notary_contracts.insert(id);
    }

    /// Mark a unit definition contract as locally known
    pub fn add_unit_contract(&self, id: UnitId) {
        self.state.lock().unit_contracts.insert(id);
    }

    /// Set the registration state of a (local, notary) context
    pub fn set_registered(&self, local: IdentityId, notary: NotaryId, registered: bool) {
        let mut state = self.state.lock();
        if registered {
            state.registered.insert((local, notary));
        } else {
            state.registered.remove(&(local, notary));
        }
    }

    /// Record an account as held by a (local, notary) context
    pub fn add_known_account(&self, local: IdentityId, notary: NotaryId, account: AccountId) {
        self.state
            .lock()
            .accounts
            .entry((local, notary))
            .or_default()
            .push(account);
    }

    /// Drop a reply into the incoming peer-reply mailbox
    pub fn deliver_reply(&self, local: IdentityId, reply: PeerReply) {
        self.state.lock().replies.entry(local).or_default().push(reply);
    }

    /// Drop a request into the incoming peer-request mailbox
    pub fn deliver_request(&self, local: IdentityId, request: PeerRequest) {
        self.state
            .lock()
            .requests
            .entry(local)
            .or_default()
            .push(request);
    }

    /// The admin secret stored for a registration context, if any
    pub fn admin_secret(&self, local: IdentityId, notary: NotaryId) -> Option<String> {
        self.state.lock().admin_secrets.get(&(local, notary)).cloned()
    }

    /// Requests marked complete, in completion order
    pub fn completed_requests(&self) -> Vec<(IdentityId, ReplyId)> {
        self.state.lock().completed.clone()
    }

    /// Whether an issuer record exists for the pair
    pub fn has_issuer_record(&self, local: IdentityId, issuer: IdentityId) -> bool {
        self.records.lock().contains_key(&(local, issuer))
    }

    fn record_handle(
        &self,
        local: IdentityId,
        issuer: IdentityId,
    ) -> Arc<tokio::sync::Mutex<IssuerRecord>> {
        let handle = {
            let mut records = self.records.lock();
            Arc::clone(
                records
                    .entry((local, issuer))
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(IssuerRecord::new(local, issuer)))),
            )
        };
        self.state
            .lock()
            .issuers
            .entry(local)
            .or_default()
            .insert(issuer);
        handle
    }
}

#[async_trait]
impl WalletStore for MemoryWallet {
    fn local_identities(&self) -> Vec<IdentityId> {
        self.state.lock().locals.iter().copied().collect()
    }

    fn issuers(&self, local: IdentityId) -> BTreeSet<IdentityId> {
        self.state
            .lock()
            .issuers
            .get(&local)
            .cloned()
            .unwrap_or_default()
    }

    async fn edit_issuer(
        &self,
        local: IdentityId,
        issuer: IdentityId,
    ) -> AccordResult<IssuerEditor> {
        let handle = self.record_handle(local, issuer);
        Ok(IssuerEditor::new(handle.lock_owned().await))
    }

    async fn issuer(&self, local: IdentityId, issuer: IdentityId) -> Option<IssuerRecord> {
        let handle = {
            let records = self.records.lock();
            records.get(&(local, issuer)).map(Arc::clone)
        }?;
        let record = handle.lock().await;
        Some(record.clone())
    }

    fn identity_claims(&self, id: IdentityId) -> Option<IdentityClaims> {
        self.state.lock().claims.get(&id).cloned()
    }

    fn has_notary_contract(&self, id: NotaryId) -> bool {
        self.state.lock().notary_contracts.contains(&id)
    }

    fn has_unit_contract(&self, id: UnitId) -> bool {
        self.state.lock().unit_contracts.contains(&id)
    }

    fn is_registered(&self, local: IdentityId, notary: NotaryId) -> bool {
        self.state.lock().registered.contains(&(local, notary))
    }

    fn registrations(&self, local: IdentityId) -> Vec<NotaryId> {
        self.state
            .lock()
            .registered
            .iter()
            .filter(|(id, _)| *id == local)
            .map(|(_, notary)| *notary)
            .collect()
    }

    fn accounts(&self, local: IdentityId, notary: NotaryId) -> Vec<AccountId> {
        self.state
            .lock()
            .accounts
            .get(&(local, notary))
            .cloned()
            .unwrap_or_default()
    }

    async fn set_admin_secret(
        &self,
        local: IdentityId,
        notary: NotaryId,
        secret: &str,
    ) -> AccordResult<()> {
        self.state
            .lock()
            .admin_secrets
            .insert((local, notary), secret.to_string());
        Ok(())
    }

    fn incoming_replies(&self, local: IdentityId) -> Vec<ReplyId> {
        self.state
            .lock()
            .replies
            .get(&local)
            .map(|replies| replies.iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }

    fn peer_reply(&self, local: IdentityId, reply: ReplyId) -> Option<PeerReply> {
        self.state
            .lock()
            .replies
            .get(&local)
            .and_then(|replies| replies.iter().find(|r| r.id == reply).cloned())
    }

    fn incoming_requests(&self, local: IdentityId) -> Vec<RequestId> {
        self.state
            .lock()
            .requests
            .get(&local)
            .map(|requests| requests.iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }

    fn peer_request(&self, local: IdentityId, request: RequestId) -> Option<PeerRequest> {
        self.state
            .lock()
            .requests
            .get(&local)
            .and_then(|requests| requests.iter().find(|r| r.id == request).cloned())
    }

    fn complete_request(&self, local: IdentityId, reply: ReplyId) -> AccordResult<()> {
        self.state.lock().completed.push((local, reply));
        Ok(())
    }

    fn seed_words(&self) -> String {
        self.seed_words.clone()
    }

    fn seed_passphrase(&self) -> String {
        self.seed_passphrase.clone()
    }
}
