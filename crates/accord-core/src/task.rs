//! Cooperative shutdown signaling
//!
//! Every long-lived worker in the engine — the refresh poller, the pairing
//! sweep, the per-context operation workers — observes one shared shutdown
//! signal. Cancellation is cooperative and coarse-grained: workers check the
//! token at well-defined checkpoints and between waits; an in-flight remote
//! action always runs to completion or timeout.

use tokio::sync::watch;

/// Owner side of the shutdown signal
///
/// Constructed once by whoever owns the engine lifecycle; hand out
/// [`ShutdownToken`]s to every worker.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Create a controller in the "running" state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Derive a token observing this controller
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal shutdown to every outstanding token
    pub fn trip(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been signaled
    pub fn is_tripped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the shutdown signal
///
/// Cheap to clone; a dropped controller counts as shutdown so orphaned
/// workers cannot outlive their owner.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Non-blocking cancellation check
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves when shutdown is signaled (or the controller is gone)
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
