//! Scheduler: admission control and task execution.
//!
//! Admission (concurrency check + credit reservation) runs under the
//! owner's lock from the shared lock table, so two concurrent submissions
//! from one owner cannot both pass a check only one of them satisfies.
//! Execution is asynchronous: submission returns as soon as the task is
//! admitted and enqueued.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::models::{Pagination, TaskDbModel, TaskFilters, TaskInput, TaskStatus};
use crate::database::repositories::{AccountRepository, TaskRepository};
use crate::domain::language::{is_supported_language, is_supported_voice};
use crate::domain::plan::plan_for_tier_str;
use crate::domain::CostModel;
use crate::ledger::{Ledger, OwnerLocks};
use crate::pipeline::{PipelineOutput, PipelineRequest, ProgressSender, VideoPipeline};
use crate::scheduler::DispatchQueue;
use crate::{Error, Result};

/// Scheduler service.
pub struct Scheduler {
    task_repo: Arc<dyn TaskRepository>,
    account_repo: Arc<dyn AccountRepository>,
    ledger: Arc<Ledger>,
    locks: Arc<OwnerLocks>,
    queue: Arc<DispatchQueue>,
    cost_model: Arc<dyn CostModel>,
    pipeline: Arc<dyn VideoPipeline>,
    pipeline_timeout: Duration,
    /// Cancellation tokens of tasks currently held by an executor.
    running: DashMap<String, CancellationToken>,
    /// Task id -> reservation id for every admitted, unsettled task.
    reservations: DashMap<String, String>,
}

enum RunOutcome {
    Success(PipelineOutput),
    Failure(String),
    TimedOut,
    Aborted,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        account_repo: Arc<dyn AccountRepository>,
        ledger: Arc<Ledger>,
        queue: Arc<DispatchQueue>,
        cost_model: Arc<dyn CostModel>,
        pipeline: Arc<dyn VideoPipeline>,
        pipeline_timeout: Duration,
    ) -> Self {
        let locks = ledger.owner_locks();
        Self {
            task_repo,
            account_repo,
            ledger,
            locks,
            queue,
            cost_model,
            pipeline,
            pipeline_timeout,
            running: DashMap::new(),
            reservations: DashMap::new(),
        }
    }

    pub fn queue(&self) -> Arc<DispatchQueue> {
        self.queue.clone()
    }

    /// Admit a new task.
    ///
    /// Fails synchronously with `ConcurrencyLimitExceeded` or
    /// `InsufficientCredit` without creating anything; on success the task
    /// is PENDING, its cost is held against the owner's balance, and an
    /// executor has been signalled.
    pub async fn submit(
        &self,
        owner_id: &str,
        input: TaskInput,
        target_language: &str,
        voice: &str,
    ) -> Result<TaskDbModel> {
        if !is_supported_language(target_language) {
            return Err(Error::validation(format!(
                "unsupported language: {target_language}"
            )));
        }
        if !is_supported_voice(voice) {
            return Err(Error::validation(format!("unsupported voice: {voice}")));
        }
        if let TaskInput::Text(text) = &input
            && text.trim().is_empty()
        {
            return Err(Error::validation("text input must not be empty"));
        }

        let cost = self.cost_model.price(&input);
        let account = self.account_repo.get_or_create(owner_id).await?;
        let plan = plan_for_tier_str(&account.plan_tier);

        let guard = self.locks.acquire(owner_id).await;

        let active = self.task_repo.count_active(owner_id).await?;
        if active >= plan.concurrency_limit as i64 {
            return Err(Error::ConcurrencyLimitExceeded {
                limit: plan.concurrency_limit,
            });
        }

        let reservation = self.ledger.reserve(owner_id, cost).await?;

        let task = TaskDbModel::new(owner_id, input, target_language, voice, cost);
        if let Err(e) = self.task_repo.create_task(&task).await {
            // `release` re-acquires the owner lock, so give it up first.
            drop(guard);
            self.ledger.release(&reservation.id).await;
            return Err(e);
        }
        self.reservations.insert(task.id.clone(), reservation.id);

        drop(guard);
        self.queue.signal();

        info!(
            owner_id,
            task_id = %task.id,
            cost,
            "task admitted"
        );
        Ok(task)
    }

    /// Fetch a task, scoped to its owner.
    pub async fn get_task(&self, task_id: &str, owner_id: &str) -> Result<TaskDbModel> {
        let task = self.task_repo.get_task(task_id).await?;
        if task.owner_id != owner_id {
            return Err(Error::not_found("Task", task_id));
        }
        Ok(task)
    }

    /// List an owner's tasks with total count for pagination.
    pub async fn list_tasks(
        &self,
        owner_id: &str,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<(Vec<TaskDbModel>, i64)> {
        let tasks = self
            .task_repo
            .list_tasks(owner_id, filters, pagination)
            .await?;
        let total = self.task_repo.count_tasks(owner_id, filters).await?;
        Ok((tasks, total))
    }

    /// Cancel a task before it reaches a terminal state.
    ///
    /// The credit hold and the concurrency slot are released immediately;
    /// a running pipeline is told to stop but may keep working in the
    /// background, which is harmless since its terminal callback becomes a
    /// no-op.
    pub async fn cancel(&self, task_id: &str, owner_id: &str) -> Result<TaskDbModel> {
        let task = self.get_task(task_id, owner_id).await?;
        let status = TaskStatus::parse(&task.status)
            .ok_or_else(|| Error::Database(format!("unknown task status: {}", task.status)))?;
        if status.is_terminal() {
            return Err(Error::AlreadyTerminal {
                status: task.status,
            });
        }

        let applied = self
            .task_repo
            .transition(task_id, TaskStatus::Cancelled, None, None)
            .await?;
        if !applied {
            let task = self.task_repo.get_task(task_id).await?;
            return Err(Error::AlreadyTerminal {
                status: task.status,
            });
        }

        self.release_reservation(task_id).await;
        if let Some(token) = self.running.get(task_id) {
            token.cancel();
        }

        info!(owner_id, task_id, "task cancelled");
        self.task_repo.get_task(task_id).await
    }

    /// Claim and run one pending task. Returns false when the backlog is
    /// empty.
    pub async fn run_next(&self) -> Result<bool> {
        let Some(task) = self.task_repo.claim_next_pending().await? else {
            return Ok(false);
        };
        self.execute(task).await;
        Ok(true)
    }

    /// Number of tasks waiting for an executor.
    pub async fn pending_depth(&self) -> Result<i64> {
        self.task_repo.count_by_status(TaskStatus::Pending).await
    }

    /// Re-register a reservation discovered during startup recovery.
    pub(crate) fn restore_reservation(&self, task_id: &str, reservation_id: &str) {
        self.reservations
            .insert(task_id.to_string(), reservation_id.to_string());
    }

    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn task_repo(&self) -> &dyn TaskRepository {
        self.task_repo.as_ref()
    }

    async fn release_reservation(&self, task_id: &str) {
        if let Some((_, reservation_id)) = self.reservations.remove(task_id) {
            self.ledger.release(&reservation_id).await;
        }
    }

    /// Run a claimed task to its terminal state.
    ///
    /// The pipeline future runs in its own tokio task so a panic inside a
    /// stage surfaces as a JoinError here instead of killing the executor;
    /// every exit path below leaves the task terminal with its reservation
    /// settled or released.
    async fn execute(&self, task: TaskDbModel) {
        let task_id = task.id.clone();
        let owner_id = task.owner_id.clone();

        let cancel = CancellationToken::new();
        self.running.insert(task_id.clone(), cancel.clone());

        // A cancellation that landed between the claim and the registration
        // above has already transitioned the task; catch up so the run is
        // abandoned immediately.
        if let Ok(current) = self.task_repo.get_task(&task_id).await
            && current.status == TaskStatus::Cancelled.as_str()
        {
            cancel.cancel();
        }

        let (progress_tx, mut progress_rx) = ProgressSender::channel();
        let forwarder = {
            let task_repo = self.task_repo.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move {
                while let Some(pct) = progress_rx.recv().await {
                    if let Err(e) = task_repo.update_progress(&task_id, pct).await {
                        debug!(task_id = %task_id, "progress update dropped: {e}");
                    }
                }
            })
        };

        let mut handle = {
            let pipeline = self.pipeline.clone();
            let request = PipelineRequest::from_task(&task);
            let child = cancel.child_token();
            tokio::spawn(async move { pipeline.process(request, progress_tx, child).await })
        };

        debug!(task_id = %task_id, owner_id = %owner_id, "pipeline started");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                // The cancel path already transitioned the task and released
                // the hold; abandon the external work.
                handle.abort();
                let _ = (&mut handle).await;
                RunOutcome::Aborted
            }
            result = tokio::time::timeout(self.pipeline_timeout, &mut handle) => {
                match result {
                    Ok(Ok(Ok(output))) => RunOutcome::Success(output),
                    Ok(Ok(Err(e))) => RunOutcome::Failure(e.to_string()),
                    Ok(Err(join_err)) if join_err.is_panic() => {
                        RunOutcome::Failure(format!("pipeline panicked: {join_err}"))
                    }
                    Ok(Err(_)) => RunOutcome::Failure("pipeline execution aborted".to_string()),
                    Err(_) => {
                        handle.abort();
                        let _ = (&mut handle).await;
                        RunOutcome::TimedOut
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Success(output) => {
                self.finish_success(&task, &output).await;
            }
            RunOutcome::Failure(message) => {
                self.finish_failure(&task, &message).await;
            }
            RunOutcome::TimedOut => {
                let message = format!(
                    "pipeline timed out after {}s",
                    self.pipeline_timeout.as_secs()
                );
                self.finish_failure(&task, &message).await;
            }
            RunOutcome::Aborted => {}
        }

        self.running.remove(&task_id);
        let _ = forwarder.await;
    }

    async fn finish_success(&self, task: &TaskDbModel, output: &PipelineOutput) {
        let applied = match self
            .task_repo
            .transition(
                &task.id,
                TaskStatus::Completed,
                Some(&output.output_ref),
                None,
            )
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                error!(task_id = %task.id, "completion transition failed: {e}");
                return;
            }
        };

        if !applied {
            // Cancelled while the pipeline was finishing; the hold is gone.
            debug!(task_id = %task.id, "completion after terminal state, ignoring");
            return;
        }

        let reservation_id = self
            .reservations
            .remove(&task.id)
            .map(|(_, id)| id)
            .unwrap_or_else(|| task.id.clone());
        if let Err(e) = self
            .ledger
            .settle_consume(
                &task.owner_id,
                &task.id,
                task.reserved_credits,
                &reservation_id,
            )
            .await
        {
            // The COMPLETED task keeps settled_at NULL; startup recovery
            // retries the settlement.
            error!(task_id = %task.id, "settlement failed, deferred to recovery: {e}");
        }

        info!(task_id = %task.id, output_ref = %output.output_ref, "task completed");
    }

    async fn finish_failure(&self, task: &TaskDbModel, message: &str) {
        let applied = match self
            .task_repo
            .transition(&task.id, TaskStatus::Failed, None, Some(message))
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                error!(task_id = %task.id, "failure transition failed: {e}");
                return;
            }
        };

        if applied {
            self.release_reservation(&task.id).await;
            warn!(task_id = %task.id, "task failed: {message}");
        }
    }
}
