//! Cooperative shutdown.
//!
//! One [`CancellationToken`] is handed to every long-running task; a
//! [`TaskTracker`] is the join barrier that `shutdown` waits on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use engine_logging::engine_info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared signal; pass a clone to every suspension point.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that `shutdown` will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Broadcast cancellation. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        engine_info!("Shutdown signal received, cancelling outstanding work");
        self.token.cancel();
        true
    }

    /// Cancel everything and block until every tracked task has exited.
    pub async fn shutdown(&self) {
        self.trigger();
        self.tracker.close();
        self.tracker.wait().await;
        engine_info!("All workers done, shutting down");
    }
}
