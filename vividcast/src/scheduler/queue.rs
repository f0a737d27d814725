//! Dispatch queue signalling.
//!
//! The pending backlog itself is durable (the `tasks` table is the queue);
//! this type only wakes executors when new work is admitted or re-enqueued.
//! Executors also poll on an interval, so a missed wakeup delays a task by
//! at most one poll period.

use tokio::sync::Notify;

/// Wakeup channel between the scheduler and the worker pool.
#[derive(Default)]
pub struct DispatchQueue {
    notify: Notify,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a pending task may be available.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Wait for a wakeup.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
