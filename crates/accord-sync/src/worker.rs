//! Per-context background worker
//!
//! One worker per context drains that context's operation queues and runs
//! the corresponding remote actions. The loop is wakeup-driven: an empty
//! bundle costs no CPU. Each dequeued task is attempted exactly once per
//! dequeue — a failed attempt finishes as a failure and is retried only when
//! a caller schedules it again (the triggering condition still holds, so the
//! next sweep will).

use crate::engine::SyncEngine;
use crate::queue::{ContextId, OperationQueue};
use crate::status::TaskStatus;
use accord_core::effects::{BoxedAction, SendOutcome};
use accord_core::{ContractId, TaskId};
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) async fn context_worker(
    engine: Arc<SyncEngine>,
    ctx: ContextId,
    queue: Arc<OperationQueue>,
) {
    debug!(%ctx, "context worker started");

    loop {
        if engine.token().is_cancelled() {
            break;
        }

        // Arm the wakeup before draining so a push that lands mid-drain is
        // not lost.
        let wakeup = queue.signal.notified();
        engine.drain_context(&ctx, &queue).await;

        if engine.token().is_cancelled() {
            break;
        }

        tokio::select! {
            _ = wakeup => {}
            _ = engine.token().cancelled() => break,
        }
    }

    debug!(%ctx, "context worker stopped");
}

impl SyncEngine {
    /// One drain pass over a context's queues, in fixed order
    pub(crate) async fn drain_context(&self, ctx: &ContextId, queue: &OperationQueue) {
        while let Some((publish_claims, task)) = queue.register_identity.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.statuses().set(task, TaskStatus::Running);
            let success = if self.wallet().is_registered(ctx.local, ctx.notary) {
                trace!(%ctx, "already registered");
                true
            } else {
                self.run_action(
                    self.actions()
                        .register_identity(ctx.local, ctx.notary, publish_claims),
                )
                .await
            };
            self.statuses().set(task, TaskStatus::Finished(success));
        }

        while let Some((target, task)) = queue.check_identity.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.execute(
                task,
                self.actions().download_identity(ctx.local, ctx.notary, target),
            )
            .await;
        }

        while let Some((contract, task)) = queue.download_contract.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.execute(
                task,
                self.actions()
                    .download_contract(ctx.local, ctx.notary, contract),
            )
            .await;
        }

        while let Some((account, task)) = queue.download_account.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.execute(
                task,
                self.actions()
                    .download_account(ctx.local, ctx.notary, account),
            )
            .await;
        }

        while let Some((_, task)) = queue.download_mailbox.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.execute(task, self.actions().download_mailbox(ctx.local, ctx.notary))
                .await;
        }

        while let Some((message, task)) = queue.send_message.try_pop() {
            if self.token().is_cancelled() {
                return;
            }
            self.execute(
                task,
                self.actions()
                    .send_message(ctx.local, ctx.notary, message.recipient, &message.body),
            )
            .await;
        }

        // The introduction context additionally services the global missing
        // queues.
        if self.introduction_notary() == Some(ctx.notary) {
            while let Some((target, task)) = self.missing_identities.try_pop() {
                if self.token().is_cancelled() {
                    return;
                }
                self.execute(
                    task,
                    self.actions().download_identity(ctx.local, ctx.notary, target),
                )
                .await;
            }

            while let Some((notary, task)) = self.missing_notaries.try_pop() {
                if self.token().is_cancelled() {
                    return;
                }
                self.execute(
                    task,
                    self.actions().download_contract(
                        ctx.local,
                        ctx.notary,
                        ContractId::Notary(notary),
                    ),
                )
                .await;
            }
        }
    }

    async fn execute(&self, task: TaskId, action: BoxedAction) -> bool {
        self.statuses().set(task, TaskStatus::Running);
        let success = self.run_action(action).await;
        self.statuses().set(task, TaskStatus::Finished(success));
        success
    }

    /// Run one remote action under the session gate
    async fn run_action(&self, mut action: BoxedAction) -> bool {
        let permit = self.gate().acquire().await;
        action.run().await;
        drop(permit);

        match action.last_send_result() {
            SendOutcome::ValidReply => {
                let reply = action
                    .reply()
                    .expect("action reported a valid reply but exposes none");
                reply.success
            }
            outcome => {
                debug!(?outcome, "remote action did not complete");
                false
            }
        }
    }
}
