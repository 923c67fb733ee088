use metrics::gauge;
use tokio::sync::watch;

use crate::metrics::STAGEPIPE_ACTIVE_TASKS;

/// Counts the pipeline tasks that are still alive.
///
/// Every stage task and merge forwarder holds an [`ActiveTaskGuard`] for its whole lifetime,
/// including after a panic, since the guard is released on unwind. The count is a
/// diagnostic: during teardown it may briefly lag behind the real state of the runtime.
#[derive(Debug, Clone)]
pub struct ActiveTasks {
    count: watch::Sender<usize>,
}

impl ActiveTasks {
    /// Creates a tracker with no registered task.
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Registers a task and returns the guard that unregisters it on drop.
    pub fn enter(&self) -> ActiveTaskGuard {
        self.count.send_modify(|count| *count += 1);
        gauge!(STAGEPIPE_ACTIVE_TASKS).increment(1.0);

        ActiveTaskGuard {
            count: self.count.clone(),
        }
    }

    /// Returns the number of tasks currently registered.
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Waits until no task is registered anymore.
    pub async fn wait_idle(&self) {
        let mut count_rx = self.count.subscribe();
        // The tracker holds a sender, so the channel cannot close while we wait.
        let _ = count_rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ActiveTasks {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of a live task in [`ActiveTasks`].
#[derive(Debug)]
pub struct ActiveTaskGuard {
    count: watch::Sender<usize>,
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.count
            .send_modify(|count| *count = count.saturating_sub(1));
        gauge!(STAGEPIPE_ACTIVE_TASKS).decrement(1.0);
    }
}
