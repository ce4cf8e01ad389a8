//! Sweep supervision and the refresh poller
//!
//! The supervisor side of the pairing engine: the sweep-in-progress flag
//! with single-acquisition semantics (a sweep request while one is live is a
//! no-op, and the finished sweep's worker is joined before a new one is
//! spawned), the low-frequency poller that watches the sync engine's refresh
//! counter and the dirty-signal queue, and graceful shutdown.

use crate::engine::PairingEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Keeps the sweep flag raised for the lifetime of one sweep
struct SweepGuard {
    flag: Arc<AtomicBool>,
}

impl SweepGuard {
    fn new(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self { flag }
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Poller loop: observe the remote change counter and the dirty-signal
/// queue; either triggers a refresh (sweep + dispatch pass).
pub(crate) async fn refresh_poller(engine: Arc<PairingEngine>) {
    debug!("pairing refresh poller started");

    loop {
        if engine.token().is_cancelled() {
            break;
        }

        let current = engine.sync.refresh_count();
        let previous = engine.last_refresh.swap(current, Ordering::AcqRel);
        if previous != current {
            engine.refresh().await;
        }

        if engine.dirty.try_pop().is_some() {
            engine.refresh().await;
        }

        tokio::select! {
            _ = engine.token().cancelled() => break,
            _ = tokio::time::sleep(engine.config.refresh_interval) => {}
        }
    }

    debug!("pairing refresh poller stopped");
}

impl PairingEngine {
    pub(crate) async fn refresh(&self) {
        self.update_pairing().await;
        self.update_peer().await;
    }

    /// Spawn a pairing sweep unless one is already live
    ///
    /// The previous sweep's worker is joined before the replacement is
    /// spawned; sweeps replace, they never stack.
    pub(crate) async fn update_pairing(&self) {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let previous = self.sweep_handle.lock().take();
        if let Some(handle) = previous {
            let _ = handle.await;
        }

        let engine = self
            .weak
            .upgrade()
            .expect("engine is alive while its methods run");
        let handle = tokio::spawn(async move {
            let _guard = SweepGuard::new(Arc::clone(&engine.sweeping));
            engine.check_pairing().await;
        });
        *self.sweep_handle.lock() = Some(handle);
    }

    /// Run one pairing sweep inline
    ///
    /// Returns `false` without sweeping if a sweep is already live. Useful
    /// for tests and callers that need synchronous convergence instead of
    /// the poller's cadence.
    pub async fn sweep_once(&self) -> bool {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let _guard = SweepGuard::new(Arc::clone(&self.sweeping));
        self.check_pairing().await;
        true
    }

    /// Run one dispatch pass over every local identity's mailboxes inline
    pub async fn dispatch_once(&self) {
        self.update_peer().await;
    }

    /// Enumerate every (local, issuer) pair and advance its state machine
    async fn check_pairing(&self) {
        for (local, issuers) in self.issuer_map() {
            if self.token().is_cancelled() {
                return;
            }

            for issuer in issuers {
                if self.token().is_cancelled() {
                    return;
                }

                self.state_machine(local, issuer).await;
            }
        }
    }

    /// Join the poller and any in-flight sweep
    ///
    /// Call after the shared shutdown token has been tripped. An in-flight
    /// sweep gets the configured grace period to observe the signal at its
    /// next checkpoint.
    pub async fn shutdown(&self) {
        if self.sweeping.load(Ordering::Acquire) {
            tokio::time::sleep(self.config.shutdown_grace).await;
        }

        let poller = self.poller_handle.lock().take();
        if let Some(handle) = poller {
            let _ = handle.await;
        }

        let sweep = self.sweep_handle.lock().take();
        if let Some(handle) = sweep {
            let _ = handle.await;
        }
    }
}
