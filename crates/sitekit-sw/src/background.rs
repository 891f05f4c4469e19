//! Fire-and-forget work.
//!
//! Tasks spawned here never report their outcome to the caller. Failures and
//! panics are logged and dropped. Handles are kept so a host can still wait
//! for them before tearing a worker down.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::SwError;

/// Tracker for best-effort background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `task` on the current tokio runtime. Its error, if any, is
    /// logged under `label` and otherwise discarded.
    pub fn spawn_best_effort<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), SwError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match task.await {
                Ok(()) => trace!(task = label, "Best-effort task finished"),
                Err(e) => warn!(task = label, error = %e, "Best-effort task failed"),
            }
        });

        let mut handles = self.handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.handles().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every spawned task to finish. Returns how many were awaited.
    pub async fn settle(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles());
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Best-effort task panicked");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_settle_waits_for_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn_best_effort("count", async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let tasks = BackgroundTasks::new();
        tasks.spawn_best_effort("fails", async {
            Err(SwError::CacheError("disk full".to_string()))
        });

        assert_eq!(tasks.settle().await, 1);
    }

    #[tokio::test]
    async fn test_panics_are_swallowed() {
        let tasks = BackgroundTasks::new();
        let explode = true;
        tasks.spawn_best_effort("panics", async move {
            if explode {
                panic!("boom");
            }
            Ok(())
        });

        tasks.settle().await;
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_settle_on_empty() {
        assert_eq!(BackgroundTasks::new().settle().await, 0);
    }
}
