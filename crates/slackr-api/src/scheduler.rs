//! One-shot deferred actions: delayed messages and standup finalization.
//!
//! Each scheduled action runs on its own task that sleeps until its
//! deadline, then calls [`DeferredAction::fire`]. An action re-validates
//! whatever it depends on when it fires and reports [`Fired::Skipped`] if
//! that state has moved on. Failures are logged and dropped; the request
//! that scheduled the action has long since returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Outcome of firing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fired {
    Applied,
    Skipped(String),
}

/// Work that runs once at a fixed instant.
pub trait DeferredAction: Send + 'static {
    /// Short name used in logs.
    fn label(&self) -> &'static str;

    fn fire(self) -> anyhow::Result<Fired>;
}

/// Decrements the pending counter however the task ends.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

#[derive(Clone, Default)]
pub struct Scheduler {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` at `fire_at`, or as soon as possible if that has
    /// already passed. Must be called from within a tokio runtime.
    pub fn schedule<A: DeferredAction>(&self, fire_at: DateTime<Utc>, action: A) {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
        let label = action.label();

        self.pending.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard(Arc::clone(&self.pending));
        let shutdown = self.shutdown.clone();

        debug!(label, delay_ms = delay.as_millis() as u64, "deferred action scheduled");
        self.tracker.spawn(async move {
            let _pending = guard;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(label, "deferred action abandoned at shutdown");
                }
                _ = tokio::time::sleep(delay) => run(action),
            }
        });
    }

    /// Actions scheduled but not yet fired or abandoned.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Abandons every pending action. Does not wait for them.
    pub fn shutdown(&self) {
        let pending = self.pending();
        if pending > 0 {
            info!("Abandoning {} pending deferred actions", pending);
        }
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Resolves once every spawned action task has finished. Only
    /// meaningful after [`Scheduler::shutdown`].
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}

fn run<A: DeferredAction>(action: A) {
    let label = action.label();
    match action.fire() {
        Ok(Fired::Applied) => debug!(label, "deferred action applied"),
        Ok(Fired::Skipped(reason)) => warn!(label, reason = %reason, "deferred action skipped"),
        Err(e) => warn!(label, "deferred action failed: {:#}", e),
    }
}
