//! Fixed-size execution context for subscriber notifications.
//!
//! ```text
//!   dispatch loop ──acquire permit──► spawn ──► [ task ] ─► handler(payload)
//!                      ▲                           │
//!                      └──── permit released ◄─────┘
//! ```
//!
//! At most `size` notifications run at once. The dispatch loop waits for a
//! permit before spawning, so a saturated pool slows draining (which lets
//! more publishes coalesce) instead of queueing unbounded work. The loop
//! itself never holds a permit while waiting for events, so a pool of size 1
//! cannot starve itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Bounded pool of notification tasks with graceful-then-forced shutdown.
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl WorkerPool {
    /// Create a pool running at most `size` tasks concurrently. `size` is clamped to 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            abort: CancellationToken::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Notification tasks spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for a free worker slot.
    ///
    /// Returns `None` if `cancel` fires first or the pool has been shut down.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    /// Run `task` on the pool, holding `permit` until it completes or is cancelled.
    pub fn spawn<F>(&self, permit: OwnedSemaphorePermit, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = abort.cancelled() => {
                    tracing::debug!("Notification cancelled by forced shutdown");
                }
                _ = task => {}
            }
        });
    }

    /// Stop the pool: wait up to `grace` for running tasks, then cancel the rest.
    ///
    /// Returns `true` when every task finished within the grace period.
    /// Forced cancellation takes effect at the task's next `.await`; when this
    /// returns, no task is running. Safe to call more than once.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        self.permits.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }

        tracing::warn!(
            remaining = self.tracker.len(),
            grace_ms = grace.as_millis() as u64,
            "Notifications exceeded the shutdown grace period; cancelling them"
        );
        self.abort.cancel();
        self.tracker.wait().await;
        false
    }
}
