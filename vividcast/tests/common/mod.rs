//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vividcast::config::Settings;
use vividcast::database::models::{LedgerEntryKind, TaskStatus};
use vividcast::pipeline::{
    PipelineOutput, PipelineRequest, ProgressSender, VideoPipeline,
};
use vividcast::services::ServiceContainer;
use vividcast::{Error, Result};

/// A running engine over a file-backed temporary database.
pub struct TestApp {
    pub container: Arc<ServiceContainer>,
    // Held for the lifetime of the app; dropping it deletes the database.
    _dir: TempDir,
}

pub async fn spawn_app(pipeline: Arc<dyn VideoPipeline>) -> TestApp {
    spawn_app_with(pipeline, Duration::from_secs(10)).await
}

pub async fn spawn_app_with(
    pipeline: Arc<dyn VideoPipeline>,
    pipeline_timeout: Duration,
) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("vividcast-test.db");
    let settings = Settings {
        database_url: format!(
            "sqlite:{}?mode=rwc",
            db_path.to_string_lossy().replace('\\', "/")
        ),
        worker_count: 2,
        pipeline_timeout,
        ..Settings::default()
    };

    let container = Arc::new(
        ServiceContainer::new(&settings, pipeline)
            .await
            .expect("container init"),
    );

    TestApp {
        container,
        _dir: dir,
    }
}

/// Reopen the same database with a fresh container, as a restart would.
pub async fn reopen(app: &TestApp, pipeline: Arc<dyn VideoPipeline>) -> Arc<ServiceContainer> {
    let db_path = app._dir.path().join("vividcast-test.db");
    let settings = Settings {
        database_url: format!(
            "sqlite:{}?mode=rwc",
            db_path.to_string_lossy().replace('\\', "/")
        ),
        worker_count: 2,
        pipeline_timeout: Duration::from_secs(10),
        ..Settings::default()
    };
    Arc::new(
        ServiceContainer::new(&settings, pipeline)
            .await
            .expect("container reopen"),
    )
}

pub fn owner() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Seed an owner's balance through an operator adjustment.
pub async fn seed_credits(app: &TestApp, owner_id: &str, amount: i64) {
    app.container
        .ledger
        .append(owner_id, LedgerEntryKind::AdminAdjust, amount, "test seed")
        .await
        .expect("seed credits");
}

/// Point an owner's account at a plan tier without touching credits.
pub async fn set_plan(app: &TestApp, owner_id: &str, tier: &str) {
    app.container
        .account_repo
        .get_or_create(owner_id)
        .await
        .expect("account");
    app.container
        .account_repo
        .set_plan_tier(owner_id, tier)
        .await
        .expect("set tier");
}

/// Poll until the task reaches the given status.
pub async fn wait_for_status(app: &TestApp, task_id: &str, status: TaskStatus) {
    wait_for_status_on(&app.container, task_id, status).await;
}

pub async fn wait_for_status_on(
    container: &ServiceContainer,
    task_id: &str,
    status: TaskStatus,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = container.task_repo.get_task(task_id).await.expect("task");
        if task.status == status.as_str() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} stuck in {} while waiting for {}",
            task.status,
            status.as_str()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Pipeline whose behavior is scripted by the task's input text.
#[derive(Default)]
pub struct ScriptedPipeline;

#[async_trait]
impl VideoPipeline for ScriptedPipeline {
    async fn process(
        &self,
        request: PipelineRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput> {
        match request.original_text.as_deref() {
            Some("fail") => Err(Error::pipeline("document extraction failed")),
            Some("panic") => panic!("stage crashed"),
            Some("block") => {
                cancel.cancelled().await;
                Err(Error::pipeline("cancelled"))
            }
            _ => {
                progress.report(20);
                progress.report(85);
                Ok(PipelineOutput {
                    output_ref: format!("outputs/{}/video.mp4", request.task_id),
                    video_duration_secs: Some(120),
                })
            }
        }
    }
}
