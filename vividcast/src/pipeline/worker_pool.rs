//! Worker pool draining the dispatch queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::scheduler::{DispatchQueue, Scheduler};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent executors.
    pub max_workers: usize,
    /// Poll interval for missed wakeups.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A bounded pool of executors. Each executor owns at most one task at a
/// time; pipeline crashes and timeouts are absorbed inside
/// `Scheduler::run_next`, so an executor never dies with a task stuck in
/// PROCESSING.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Start the executors.
    pub fn start(&self, scheduler: Arc<Scheduler>, queue: Arc<DispatchQueue>) {
        info!("Starting worker pool with {} executors", self.config.max_workers);

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.config.max_workers {
                let semaphore = self.semaphore.clone();
                let cancellation_token = self.cancellation_token.clone();
                let scheduler = scheduler.clone();
                let queue = queue.clone();
                let poll_interval = self.config.poll_interval;

                join_set.spawn(async move {
                    debug!("executor {} started", i);

                    loop {
                        if cancellation_token.is_cancelled() {
                            debug!("executor {} shutting down", i);
                            break;
                        }

                        tokio::select! {
                            _ = cancellation_token.cancelled() => {
                                break;
                            }
                            _ = queue.wait() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }

                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => continue,
                        };

                        match scheduler.run_next().await {
                            Ok(true) => {
                                // There may be more backlog; wake another
                                // executor without waiting for the poll tick.
                                queue.signal();
                            }
                            Ok(false) => {}
                            Err(e) => {
                                error!("executor {} failed to claim a task: {}", i, e);
                            }
                        }

                        drop(permit);
                    }
                });
            }
        }
    }

    /// Stop the pool and wait for in-flight executors to finish.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 4);
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(WorkerPoolConfig::default());
        assert!(pool.is_running());
    }
}
