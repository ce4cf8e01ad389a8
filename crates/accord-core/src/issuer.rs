//! Issuer bookkeeping record
//!
//! One record per (local identity, issuer identity) relationship, owned by
//! the wallet collaborator and mutated exclusively through an [`IssuerEditor`]
//! lease. The record tracks the pairing secret, the trust flag, every peer
//! request the engine has initiated (with its reply correlation and used
//! flag), the accounts registered per advertised unit, and received
//! connection credentials.
//!
//! Invariants the record enforces itself:
//! - a reply correlates to a request at most once; the duplicate recording
//!   returns `false` and changes nothing
//! - a request can be marked used only after a reply has been correlated
//! - at most one account entry exists per (unit kind, unit) pair

use crate::claims::UnitKind;
use crate::peer::{ConnectionKind, PeerRequestKind};
use crate::types::{AccountId, IdentityId, ReplyId, RequestId, UnitId};
use serde::{Deserialize, Serialize};

/// One initiated or received peer request with its correlation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEntry {
    /// Message kind of the request
    pub kind: PeerRequestKind,
    /// Request identifier
    pub id: RequestId,
    /// Correlated reply, once one has been recorded
    pub reply: Option<ReplyId>,
    /// Whether the instruction carried by the reply has been consumed
    pub used: bool,
    /// Unit the request concerns (bailment requests)
    pub unit: Option<UnitId>,
    /// Connection kind the request concerns (connection-info requests)
    pub connection: Option<ConnectionKind>,
}

/// One registered account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Claim classification the account was registered under
    pub kind: UnitKind,
    /// Unit definition the account holds
    pub unit: UnitId,
    /// The account identifier returned by the notary
    pub account: AccountId,
}

/// Received connection credentials for one connection kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Connection kind the credentials are for
    pub kind: ConnectionKind,
    /// Opaque credential blob
    pub blob: String,
}

/// Bookkeeping for one (local identity, issuer identity) relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRecord {
    local: IdentityId,
    issuer: IdentityId,
    pairing_code: Option<String>,
    paired: bool,
    requests: Vec<RequestEntry>,
    accounts: Vec<AccountEntry>,
    connections: Vec<ConnectionEntry>,
}

impl IssuerRecord {
    /// Create an empty record for the given relationship
    pub fn new(local: IdentityId, issuer: IdentityId) -> Self {
        Self {
            local,
            issuer,
            pairing_code: None,
            paired: false,
            requests: Vec::new(),
            accounts: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// The local identity side of the relationship
    pub fn local_id(&self) -> IdentityId {
        self.local
    }

    /// The issuer identity side of the relationship
    pub fn issuer_id(&self) -> IdentityId {
        self.issuer
    }

    /// The pairing secret, if one has been set
    pub fn pairing_code(&self) -> Option<&str> {
        self.pairing_code.as_deref()
    }

    /// Set the pairing secret; only the first non-empty value sticks
    pub fn set_pairing_code(&mut self, code: impl Into<String>) -> bool {
        if self.pairing_code.is_some() {
            return false;
        }
        let code = code.into();
        if code.is_empty() {
            return false;
        }
        self.pairing_code = Some(code);
        true
    }

    /// Whether the relationship is trusted (paired)
    pub fn paired(&self) -> bool {
        self.paired
    }

    /// Update the trust flag
    pub fn set_paired(&mut self, paired: bool) {
        self.paired = paired;
    }

    fn entry(&self, kind: PeerRequestKind, id: RequestId) -> Option<&RequestEntry> {
        self.requests.iter().find(|e| e.kind == kind && e.id == id)
    }

    fn entry_mut(&mut self, kind: PeerRequestKind, id: RequestId) -> Option<&mut RequestEntry> {
        self.requests
            .iter_mut()
            .find(|e| e.kind == kind && e.id == id)
    }

    fn push_entry(
        &mut self,
        kind: PeerRequestKind,
        id: RequestId,
        unit: Option<UnitId>,
        connection: Option<ConnectionKind>,
    ) -> bool {
        if self.entry(kind, id).is_some() {
            return false;
        }
        self.requests.push(RequestEntry {
            kind,
            id,
            reply: None,
            used: false,
            unit,
            connection,
        });
        true
    }

    /// Record an initiated or received request
    ///
    /// Returns `false` if the request is already on file.
    pub fn add_request(&mut self, kind: PeerRequestKind, id: RequestId) -> bool {
        self.push_entry(kind, id, None, None)
    }

    /// Record an initiated bailment request against one unit
    pub fn add_unit_request(&mut self, kind: PeerRequestKind, id: RequestId, unit: UnitId) -> bool {
        self.push_entry(kind, id, Some(unit), None)
    }

    /// Record an initiated connection-info request for one connection kind
    pub fn add_connection_request(&mut self, id: RequestId, connection: ConnectionKind) -> bool {
        self.push_entry(PeerRequestKind::ConnectionInfo, id, None, Some(connection))
    }

    /// Correlate a reply to a request
    ///
    /// Creates the request entry if the request is not yet on file (replies
    /// can outrun local bookkeeping after a restart). Returns `false` if a
    /// reply is already recorded for the request; the record is unchanged.
    pub fn add_reply(&mut self, kind: PeerRequestKind, request: RequestId, reply: ReplyId) -> bool {
        if self.entry(kind, request).is_none() {
            self.push_entry(kind, request, None, None);
        }
        let entry = match self.entry_mut(kind, request) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.reply.is_some() {
            return false;
        }
        entry.reply = Some(reply);
        true
    }

    /// Mark a request's instruction as consumed
    ///
    /// Only valid once a reply has been correlated; returns `false` (and
    /// changes nothing) otherwise.
    pub fn set_used(&mut self, kind: PeerRequestKind, request: RequestId) -> bool {
        match self.entry_mut(kind, request) {
            Some(entry) if entry.reply.is_some() => {
                entry.used = true;
                true
            }
            _ => false,
        }
    }

    /// Whether any request of this kind has been initiated
    pub fn request_initiated(&self, kind: PeerRequestKind) -> bool {
        self.requests.iter().any(|e| e.kind == kind)
    }

    /// Whether any request of this kind has a correlated reply
    pub fn request_complete(&self, kind: PeerRequestKind) -> bool {
        self.requests
            .iter()
            .any(|e| e.kind == kind && e.reply.is_some())
    }

    /// Whether a connection-info request for this kind has been initiated
    pub fn connection_info_initiated(&self, kind: ConnectionKind) -> bool {
        self.requests
            .iter()
            .any(|e| e.kind == PeerRequestKind::ConnectionInfo && e.connection == Some(kind))
    }

    /// Received connection credentials for this kind, if any
    pub fn connection_info(&self, kind: ConnectionKind) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.blob.as_str())
    }

    /// Store connection credentials, replacing any previous blob
    pub fn set_connection_info(&mut self, kind: ConnectionKind, blob: impl Into<String>) {
        let blob = blob.into();
        match self.connections.iter_mut().find(|c| c.kind == kind) {
            Some(entry) => entry.blob = blob,
            None => self.connections.push(ConnectionEntry { kind, blob }),
        }
    }

    /// Record a registered account; at most one per (kind, unit)
    pub fn add_account(&mut self, kind: UnitKind, unit: UnitId, account: AccountId) -> bool {
        if self
            .accounts
            .iter()
            .any(|a| a.kind == kind && a.unit == unit)
        {
            return false;
        }
        self.accounts.push(AccountEntry {
            kind,
            unit,
            account,
        });
        true
    }

    /// Accounts registered for this (kind, unit) pair
    pub fn account_list(&self, kind: UnitKind, unit: UnitId) -> Vec<AccountId> {
        self.accounts
            .iter()
            .filter(|a| a.kind == kind && a.unit == unit)
            .map(|a| a.account)
            .collect()
    }

    /// All accounts on file
    pub fn accounts(&self) -> &[AccountEntry] {
        &self.accounts
    }

    /// Unused bailment instructions on file for this unit
    ///
    /// An instruction is a bailment request with a correlated reply that has
    /// not been marked used.
    pub fn bailment_instructions(&self, unit: UnitId) -> Vec<RequestId> {
        self.requests
            .iter()
            .filter(|e| {
                e.kind == PeerRequestKind::Bailment
                    && e.unit == Some(unit)
                    && e.reply.is_some()
                    && !e.used
            })
            .map(|e| e.id)
            .collect()
    }

    /// Whether a bailment request for this unit is awaiting its reply
    pub fn bailment_initiated(&self, unit: UnitId) -> bool {
        self.requests
            .iter()
            .any(|e| e.kind == PeerRequestKind::Bailment && e.unit == Some(unit) && e.reply.is_none())
    }
}

/// Exclusive mutation lease over one [`IssuerRecord`]
///
/// Checked out from the wallet collaborator; the lease commits on release
/// (the record is mutated in place behind the lock). Held for at most one
/// state-machine step or one dispatch handler.
pub struct IssuerEditor {
    guard: tokio::sync::OwnedMutexGuard<IssuerRecord>,
}

impl IssuerEditor {
    /// Wrap an owned guard produced by the wallet collaborator
    pub fn new(guard: tokio::sync::OwnedMutexGuard<IssuerRecord>) -> Self {
        Self { guard }
    }
}

impl std::ops::Deref for IssuerEditor {
    type Target = IssuerRecord;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl std::ops::DerefMut for IssuerEditor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
