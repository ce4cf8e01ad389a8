//! Incoming peer message dispatch
//!
//! Drains, per local identity, the incoming request and reply mailboxes and
//! routes each message by its declared kind. Handlers are idempotent:
//! at-least-once delivery is expected, so an already-recorded correlation is
//! a warning-level no-op, never an error. A single dispatch-exclusion lock
//! serializes whole passes so two passes can never race on the same issuer
//! record.
//!
//! Kind mismatches and initiator mismatches inside a handler are collaborator
//! contract breaches and abort.

use crate::engine::PairingEngine;
use accord_core::effects::SendOutcome;
use accord_core::{IdentityId, PeerReply, PeerRequest, PeerRequestKind, TaskId};
use tracing::{error, info, trace, warn};

impl PairingEngine {
    /// One pass over every local identity's incoming mailboxes
    pub(crate) async fn update_peer(&self) {
        let _guard = self.dispatch_lock.lock().await;

        for (local, _issuers) in self.issuer_map() {
            self.process_peer_replies(local).await;
            self.process_peer_requests(local).await;
        }
    }

    async fn process_peer_replies(&self, local: IdentityId) {
        for reply_id in self.wallet.incoming_replies(local) {
            let Some(reply) = self.wallet.peer_reply(local, reply_id) else {
                warn!(%reply_id, "failed to load peer reply");
                continue;
            };

            match reply.kind {
                PeerRequestKind::Bailment => {
                    info!(%reply_id, "received bailment reply");
                    self.process_bailment_reply(local, &reply).await;
                }
                PeerRequestKind::Outbailment => {
                    info!(%reply_id, "received outbailment reply");
                    self.process_outbailment_reply(local, &reply).await;
                }
                PeerRequestKind::ConnectionInfo => {
                    info!(%reply_id, "received connection info reply");
                    self.process_connection_info_reply(local, &reply).await;
                }
                PeerRequestKind::StoreSecret => {
                    info!(%reply_id, "received store secret reply");
                    self.process_store_secret_reply(local, &reply).await;
                }
                PeerRequestKind::PendingBailment
                | PeerRequestKind::VerificationOffer
                | PeerRequestKind::Faucet => {
                    trace!(kind = %reply.kind, "skipping peer reply");
                }
            }
        }
    }

    async fn process_peer_requests(&self, local: IdentityId) {
        for request_id in self.wallet.incoming_requests(local) {
            let Some(request) = self.wallet.peer_request(local, request_id) else {
                warn!(%request_id, "failed to load peer request");
                continue;
            };

            match request.kind {
                PeerRequestKind::PendingBailment => {
                    info!(%request_id, "received pending bailment notification");
                    self.process_pending_bailment(local, &request).await;
                }
                PeerRequestKind::Bailment
                | PeerRequestKind::Outbailment
                | PeerRequestKind::ConnectionInfo
                | PeerRequestKind::StoreSecret
                | PeerRequestKind::VerificationOffer
                | PeerRequestKind::Faucet => {
                    trace!(kind = %request.kind, "skipping peer request");
                }
            }
        }
    }

    async fn process_bailment_reply(&self, local: IdentityId, reply: &PeerReply) {
        self.correlate_reply(local, PeerRequestKind::Bailment, reply)
            .await;
    }

    async fn process_outbailment_reply(&self, local: IdentityId, reply: &PeerReply) {
        self.correlate_reply(local, PeerRequestKind::Outbailment, reply)
            .await;
    }

    async fn process_connection_info_reply(&self, local: IdentityId, reply: &PeerReply) {
        self.correlate_reply(local, PeerRequestKind::ConnectionInfo, reply)
            .await;
    }

    async fn process_store_secret_reply(&self, local: IdentityId, reply: &PeerReply) {
        self.correlate_reply(local, PeerRequestKind::StoreSecret, reply)
            .await;
    }

    /// Record the (request → reply) correlation on the issuer record
    ///
    /// First recording marks the stored request complete and signals a
    /// follow-up sweep; a duplicate is a no-op.
    async fn correlate_reply(&self, local: IdentityId, expected: PeerRequestKind, reply: &PeerReply) {
        assert_eq!(
            reply.initiator, local,
            "peer reply initiator does not match the dispatching identity"
        );
        assert_eq!(
            reply.kind, expected,
            "peer reply kind does not match its handler"
        );

        let issuer = reply.recipient;
        let mut editor = match self.wallet.edit_issuer(local, issuer).await {
            Ok(editor) => editor,
            Err(err) => {
                error!(%err, "issuer record unavailable");
                return;
            }
        };
        let added = editor.add_reply(expected, reply.request, reply.id);
        drop(editor);

        if added {
            if let Err(err) = self.wallet.complete_request(local, reply.id) {
                error!(%err, "failed to mark peer request complete");
            }
            self.dirty.push(TaskId::nil(), true);
        } else {
            warn!(request = %reply.request, "reply already recorded");
        }
    }

    /// Handle an issuer-originated pending-bailment notification
    ///
    /// Records the request, marks the referenced bailment instruction used,
    /// and immediately acknowledges the notice.
    async fn process_pending_bailment(&self, local: IdentityId, request: &PeerRequest) {
        assert_eq!(
            request.recipient, local,
            "peer request recipient does not match the dispatching identity"
        );
        assert_eq!(
            request.kind,
            PeerRequestKind::PendingBailment,
            "peer request kind does not match its handler"
        );

        let issuer = request.initiator;
        let notary = request.notary;
        let mut editor = match self.wallet.edit_issuer(local, issuer).await {
            Ok(editor) => editor,
            Err(err) => {
                error!(%err, "issuer record unavailable");
                return;
            }
        };

        if !editor.add_request(PeerRequestKind::PendingBailment, request.id) {
            warn!(request = %request.id, "request already recorded");
            return;
        }

        match request.reference {
            Some(original) => {
                if !editor.set_used(PeerRequestKind::Bailment, original) {
                    warn!(%original, "failed to mark bailment instruction as used");
                }
            }
            None => {
                warn!(request = %request.id, "notification carries no original request id");
            }
        }

        let permit = self.gate.acquire().await;
        let mut action = self
            .actions
            .acknowledge_notice(local, notary, issuer, request.id, true);
        action.run().await;
        drop(permit);

        if action.last_send_result() == SendOutcome::ValidReply {
            let reply_id = action
                .sent_reply_id()
                .expect("action reported a valid reply but sent no peer reply");
            editor.add_reply(PeerRequestKind::PendingBailment, request.id, reply_id);
            self.dirty.push(TaskId::nil(), true);
        }
    }
}
