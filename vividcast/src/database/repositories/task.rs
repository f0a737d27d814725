//! Task repository.

use async_trait::async_trait;

use crate::database::models::{Pagination, TaskDbModel, TaskFilters, TaskStatus};
use crate::database::retry::with_busy_retry;
use crate::database::{DbPool, WritePool};
use crate::{Error, Result};

const TERMINAL_STATUSES: &str = "('COMPLETED', 'FAILED', 'CANCELLED')";

/// Task repository trait.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_task(&self, id: &str) -> Result<TaskDbModel>;
    async fn create_task(&self, task: &TaskDbModel) -> Result<()>;
    async fn list_tasks(
        &self,
        owner_id: &str,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<Vec<TaskDbModel>>;
    async fn count_tasks(&self, owner_id: &str, filters: &TaskFilters) -> Result<i64>;
    /// Count tasks in PENDING or PROCESSING for an owner.
    async fn count_active(&self, owner_id: &str) -> Result<i64>;
    /// Count all tasks in a given status.
    async fn count_by_status(&self, status: TaskStatus) -> Result<i64>;
    /// Atomically claim the oldest PENDING task, moving it to PROCESSING.
    async fn claim_next_pending(&self) -> Result<Option<TaskDbModel>>;
    /// Forward-only progress update; ignored unless the task is PROCESSING.
    /// Returns whether a row changed.
    async fn update_progress(&self, id: &str, progress: i64) -> Result<bool>;
    /// Transition to a new status unless the task is already terminal.
    /// Returns whether the transition applied.
    async fn transition(
        &self,
        id: &str,
        status: TaskStatus,
        output_ref: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool>;
    /// All tasks not yet in a terminal state, oldest first.
    async fn list_non_terminal(&self) -> Result<Vec<TaskDbModel>>;
    /// COMPLETED tasks whose settlement has not been applied.
    async fn list_unsettled_completed(&self) -> Result<Vec<TaskDbModel>>;
}

/// SQLx implementation of TaskRepository.
pub struct SqlxTaskRepository {
    pool: DbPool,
    write_pool: WritePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DbPool, write_pool: WritePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn get_task(&self, id: &str) -> Result<TaskDbModel> {
        sqlx::query_as::<_, TaskDbModel>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Task", id))
    }

    async fn create_task(&self, task: &TaskDbModel) -> Result<()> {
        let task = task.clone();
        with_busy_retry("create_task", || {
            let task = task.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO tasks (
                        id, owner_id, input_kind, original_text, source_url, input_file_ref,
                        target_language, voice, status, progress, output_ref, error_message,
                        reserved_credits, settled_at, created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&task.id)
                .bind(&task.owner_id)
                .bind(&task.input_kind)
                .bind(&task.original_text)
                .bind(&task.source_url)
                .bind(&task.input_file_ref)
                .bind(&task.target_language)
                .bind(&task.voice)
                .bind(&task.status)
                .bind(task.progress)
                .bind(&task.output_ref)
                .bind(&task.error_message)
                .bind(task.reserved_credits)
                .bind(&task.settled_at)
                .bind(&task.created_at)
                .bind(&task.updated_at)
                .execute(&self.write_pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    async fn list_tasks(
        &self,
        owner_id: &str,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<Vec<TaskDbModel>> {
        let pagination = pagination.clamped();
        let tasks = match filters.status {
            Some(status) => {
                sqlx::query_as::<_, TaskDbModel>(
                    "SELECT * FROM tasks WHERE owner_id = ? AND status = ? \
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(owner_id)
                .bind(status.as_str())
                .bind(pagination.limit())
                .bind(pagination.offset())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TaskDbModel>(
                    "SELECT * FROM tasks WHERE owner_id = ? \
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(owner_id)
                .bind(pagination.limit())
                .bind(pagination.offset())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(tasks)
    }

    async fn count_tasks(&self, owner_id: &str, filters: &TaskFilters) -> Result<i64> {
        let count: (i64,) = match filters.status {
            Some(status) => {
                sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE owner_id = ? AND status = ?")
                    .bind(owner_id)
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?,
        };
        Ok(count.0)
    }

    async fn count_active(&self, owner_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE owner_id = ? AND status IN ('PENDING', 'PROCESSING')",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn claim_next_pending(&self) -> Result<Option<TaskDbModel>> {
        with_busy_retry("claim_next_pending", || async {
            let now = chrono::Utc::now().to_rfc3339();
            let claimed = sqlx::query_as::<_, TaskDbModel>(
                r#"
                UPDATE tasks SET status = 'PROCESSING', updated_at = ?
                WHERE id = (
                    SELECT id FROM tasks WHERE status = 'PENDING'
                    ORDER BY created_at ASC, rowid ASC LIMIT 1
                )
                AND status = 'PENDING'
                RETURNING *
                "#,
            )
            .bind(&now)
            .fetch_optional(&self.write_pool)
            .await?;
            Ok(claimed)
        })
        .await
    }

    async fn update_progress(&self, id: &str, progress: i64) -> Result<bool> {
        let progress = progress.clamp(0, 100);
        with_busy_retry("update_progress", || async {
            let now = chrono::Utc::now().to_rfc3339();
            let result = sqlx::query(
                "UPDATE tasks SET progress = ?, updated_at = ? \
                 WHERE id = ? AND status = 'PROCESSING' AND progress < ?",
            )
            .bind(progress)
            .bind(&now)
            .bind(id)
            .bind(progress)
            .execute(&self.write_pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn transition(
        &self,
        id: &str,
        status: TaskStatus,
        output_ref: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        with_busy_retry("transition", || async {
            let now = chrono::Utc::now().to_rfc3339();
            let sql = format!(
                "UPDATE tasks SET status = ?, output_ref = ?, error_message = ?, \
                 progress = CASE WHEN ? = 'COMPLETED' THEN 100 ELSE progress END, \
                 updated_at = ? \
                 WHERE id = ? AND status NOT IN {TERMINAL_STATUSES}"
            );
            let result = sqlx::query(&sql)
                .bind(status.as_str())
                .bind(output_ref)
                .bind(error_message)
                .bind(status.as_str())
                .bind(&now)
                .bind(id)
                .execute(&self.write_pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn list_non_terminal(&self) -> Result<Vec<TaskDbModel>> {
        let sql = format!(
            "SELECT * FROM tasks WHERE status NOT IN {TERMINAL_STATUSES} \
             ORDER BY created_at ASC, rowid ASC"
        );
        let tasks = sqlx::query_as::<_, TaskDbModel>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn list_unsettled_completed(&self) -> Result<Vec<TaskDbModel>> {
        let tasks = sqlx::query_as::<_, TaskDbModel>(
            "SELECT * FROM tasks WHERE status = 'COMPLETED' AND settled_at IS NULL \
             ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }
}
