//! Shutdown coordination for the wiretap.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;

/// Coordinator for graceful shutdown.
///
/// Every flow session and every dispatch runs on the tracker, so shutdown can
/// wait for in-flight work; long waits (delayed replicas) watch the token.
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task that shutdown will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Resolves once shutdown has been triggered.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// A token cancelled by `trigger`, for work outside the runtime.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Number of tracked tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every tracked task, giving up after `grace`.
    ///
    /// Returns false if tasks were still running at the deadline.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_waits_for_tasks() {
        let shutdown = Shutdown::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        shutdown.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });
        assert_eq!(shutdown.in_flight(), 1);
        assert!(shutdown.drain(Duration::from_secs(5)).await);
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let shutdown = Shutdown::new();
        let watcher = shutdown.clone();
        let task = shutdown.spawn(async move { watcher.cancelled().await });
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn drain_gives_up_after_grace() {
        let shutdown = Shutdown::new();
        shutdown.spawn(tokio::time::sleep(Duration::from_secs(60)));
        assert!(!shutdown.drain(Duration::from_millis(20)).await);
    }
}
