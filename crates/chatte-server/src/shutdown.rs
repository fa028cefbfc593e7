//! Process-wide shutdown scope.
//!
//! The coordinator owns the root [`CancellationToken`]; the hub and every
//! connection hang off it. Long-lived server tasks are spawned through
//! [`ShutdownCoordinator::spawn`] so shutdown can wait for them.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Root cancellation scope plus the tasks that must drain on shutdown.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the root scope.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that shutdown waits for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Number of tracked tasks still running.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel the root scope and wait up to `timeout` for tracked tasks.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tasks.close();
        info!(
            task_count = self.tasks.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for tasks to complete"
        );
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(remaining = self.tasks.len(), "shutdown timed out after {timeout:?}");
            return false;
        }
        info!("shutdown complete");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_is_idempotent_and_reaches_children() {
        let coord = ShutdownCoordinator::new();
        let child = coord.token().child_token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _ = coord.spawn(async move {
            token.cancelled().await;
            let _ = tx.send(());
        });

        assert!(coord.graceful_shutdown(Duration::from_secs(1)).await);
        assert!(rx.await.is_ok());
        assert_eq!(coord.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let _ = coord.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert!(!coord.graceful_shutdown(Duration::from_secs(1)).await);
        assert_eq!(coord.task_count(), 1);
    }
}
