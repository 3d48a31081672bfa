//! Shared shutdown for tail workers.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tracks the background workers of many [`Tail`](super::Tail) sessions so
/// they can be stopped together.
#[derive(Debug, Clone, Default)]
pub struct TailSupervisor {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TailSupervisor {
    /// Create an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when the supervisor shuts down.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Spawn a tracked task on the current runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future)
    }

    /// Spawn a tracked task on `handle`.
    pub fn spawn_on<F>(&self, future: F, handle: &Handle) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(future, handle)
    }

    /// Number of workers still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Whether no worker is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Cancel every worker and wait up to `timeout` for them to finish.
    /// Returns `false` if some were still running.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();
        let finished = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !finished {
            tracing::warn!(remaining = self.tracker.len(), "Tail workers did not stop in time");
        }
        finished
    }
}
