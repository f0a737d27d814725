//! Service container for dependency injection.
//!
//! The ServiceContainer holds references to all application services and
//! manages their lifecycle: pools and migrations first, then repositories,
//! ledger, scheduler, worker pool and billing runner.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::info;

use crate::api::AppState;
use crate::billing::{BillingCycleRunner, PaymentService};
use crate::config::Settings;
use crate::database::repositories::{
    AccountRepository, LedgerRepository, SqlxAccountRepository, SqlxLedgerRepository,
    SqlxSubscriptionRepository, SqlxTaskRepository, SubscriptionRepository, TaskRepository,
};
use crate::database::{self, DbPool, WritePool};
use crate::domain::SegmentEstimateCostModel;
use crate::ledger::{Ledger, OwnerLocks};
use crate::pipeline::{VideoPipeline, WorkerPool, WorkerPoolConfig};
use crate::scheduler::{recovery, DispatchQueue, RecoveryReport, Scheduler};
use crate::Result;

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Read pool.
    pub pool: DbPool,
    /// Serialized write pool.
    pub write_pool: WritePool,
    pub task_repo: Arc<dyn TaskRepository>,
    pub account_repo: Arc<dyn AccountRepository>,
    pub ledger_repo: Arc<dyn LedgerRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<Ledger>,
    pub scheduler: Arc<Scheduler>,
    pub queue: Arc<DispatchQueue>,
    pub worker_pool: Arc<WorkerPool>,
    pub billing_runner: Arc<BillingCycleRunner>,
    pub payment_service: Arc<PaymentService>,
    start_time: Instant,
    billing_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceContainer {
    /// Create the container: open pools, run migrations, wire services.
    pub async fn new(settings: &Settings, pipeline: Arc<dyn VideoPipeline>) -> Result<Self> {
        info!("Initializing service container");

        let pool = database::init_pool(&settings.database_url).await?;
        let write_pool = database::init_write_pool(&settings.database_url).await?;
        database::run_migrations(&pool).await?;

        let task_repo: Arc<dyn TaskRepository> =
            Arc::new(SqlxTaskRepository::new(pool.clone(), write_pool.clone()));
        let account_repo: Arc<dyn AccountRepository> =
            Arc::new(SqlxAccountRepository::new(pool.clone(), write_pool.clone()));
        let ledger_repo: Arc<dyn LedgerRepository> =
            Arc::new(SqlxLedgerRepository::new(pool.clone(), write_pool.clone()));
        let subscription_repo: Arc<dyn SubscriptionRepository> = Arc::new(
            SqlxSubscriptionRepository::new(pool.clone(), write_pool.clone()),
        );

        let locks = Arc::new(OwnerLocks::new());
        let ledger = Arc::new(Ledger::new(pool.clone(), write_pool.clone(), locks));

        let queue = Arc::new(DispatchQueue::new());
        let scheduler = Arc::new(Scheduler::new(
            task_repo.clone(),
            account_repo.clone(),
            ledger.clone(),
            queue.clone(),
            Arc::new(SegmentEstimateCostModel),
            pipeline,
            settings.pipeline_timeout,
        ));

        let worker_pool = Arc::new(WorkerPool::new(WorkerPoolConfig {
            max_workers: settings.worker_count,
            ..WorkerPoolConfig::default()
        }));

        let billing_runner = Arc::new(BillingCycleRunner::new(
            subscription_repo.clone(),
            account_repo.clone(),
            ledger.clone(),
            &settings.billing_schedule,
        )?);

        let payment_service = Arc::new(PaymentService::new(
            pool.clone(),
            write_pool.clone(),
            account_repo.clone(),
            subscription_repo.clone(),
            ledger.clone(),
        ));

        Ok(Self {
            pool,
            write_pool,
            task_repo,
            account_repo,
            ledger_repo,
            subscription_repo,
            ledger,
            scheduler,
            queue,
            worker_pool,
            billing_runner,
            payment_service,
            start_time: Instant::now(),
            billing_handle: parking_lot::Mutex::new(None),
        })
    }

    /// Reconcile persisted state, then start executors and the billing
    /// runner.
    pub async fn start(&self) -> Result<RecoveryReport> {
        let report = recovery::reconcile(&self.scheduler).await?;

        self.worker_pool
            .start(self.scheduler.clone(), self.queue.clone());
        let handle = self.billing_runner.clone().spawn();
        *self.billing_handle.lock() = Some(handle);

        Ok(report)
    }

    /// Stop background work and wait for in-flight executors.
    pub async fn shutdown(&self) {
        info!("Shutting down service container");
        self.billing_runner.stop();
        self.worker_pool.stop().await;
        if let Some(handle) = self.billing_handle.lock().take() {
            handle.abort();
        }
        info!("Service container stopped");
    }

    /// Shared state handed to the API layer.
    pub fn app_state(&self) -> AppState {
        AppState {
            start_time: self.start_time,
            scheduler: self.scheduler.clone(),
            ledger: self.ledger.clone(),
            ledger_repo: self.ledger_repo.clone(),
            account_repo: self.account_repo.clone(),
            subscription_repo: self.subscription_repo.clone(),
            payment_service: self.payment_service.clone(),
        }
    }
}
