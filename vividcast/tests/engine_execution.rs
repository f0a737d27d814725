//! Execution and settlement: the worker pool drives admitted tasks to a
//! terminal state and the ledger reconciles each outcome.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    owner, seed_credits, spawn_app, spawn_app_with, wait_for_status, ScriptedPipeline,
};
use vividcast::database::models::{LedgerEntryKind, TaskInput, TaskStatus};

const SHORT_TEXT_COST: i64 = 90;

async fn consume_entries(
    app: &common::TestApp,
    owner_id: &str,
) -> Vec<vividcast::database::models::LedgerEntryDbModel> {
    app.container
        .ledger_repo
        .list_entries_chronological(owner_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == LedgerEntryKind::TaskConsume.as_str())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completed_task_consumes_exactly_its_reservation() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    app.container.start().await.unwrap();

    let owner = owner();
    seed_credits(&app, &owner, 200).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("an article".into()), "en", "Achernar")
        .await
        .unwrap();

    wait_for_status(&app, &task.id, TaskStatus::Completed).await;

    let finished = app.container.task_repo.get_task(&task.id).await.unwrap();
    assert_eq!(finished.progress, 100);
    assert!(finished.output_ref.as_deref().unwrap().contains(&task.id));
    assert!(finished.error_message.is_none());
    assert!(finished.settled_at.is_some());

    assert_eq!(
        app.container.ledger.balance(&owner).await.unwrap(),
        200 - SHORT_TEXT_COST
    );
    assert_eq!(app.container.ledger.outstanding(&owner), 0);

    let consumes = consume_entries(&app, &owner).await;
    assert_eq!(consumes.len(), 1);
    assert_eq!(consumes[0].amount, -SHORT_TEXT_COST);
    assert_eq!(consumes[0].task_id.as_deref(), Some(task.id.as_str()));

    app.container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_task_releases_its_hold_without_charge() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    app.container.start().await.unwrap();

    let owner = owner();
    seed_credits(&app, &owner, 200).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("fail".into()), "en", "Achernar")
        .await
        .unwrap();

    wait_for_status(&app, &task.id, TaskStatus::Failed).await;

    let finished = app.container.task_repo.get_task(&task.id).await.unwrap();
    assert!(finished.output_ref.is_none());
    assert!(
        finished
            .error_message
            .as_deref()
            .unwrap()
            .contains("extraction failed")
    );

    // No net deduction for a failed task.
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 200);
    assert_eq!(app.container.ledger.available(&owner).await.unwrap(), 200);
    assert!(consume_entries(&app, &owner).await.is_empty());

    app.container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_panic_becomes_a_failed_transition() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    app.container.start().await.unwrap();

    let owner = owner();
    seed_credits(&app, &owner, 200).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("panic".into()), "en", "Achernar")
        .await
        .unwrap();

    wait_for_status(&app, &task.id, TaskStatus::Failed).await;

    let finished = app.container.task_repo.get_task(&task.id).await.unwrap();
    assert!(
        finished
            .error_message
            .as_deref()
            .unwrap()
            .contains("panicked")
    );
    assert_eq!(app.container.ledger.available(&owner).await.unwrap(), 200);

    // The executor survived; a follow-up task still runs.
    let next = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("recovers".into()), "en", "Achernar")
        .await
        .unwrap();
    wait_for_status(&app, &next.id, TaskStatus::Completed).await;

    app.container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipeline_timeout_fails_the_task() {
    let app = spawn_app_with(
        Arc::new(ScriptedPipeline::default()),
        Duration::from_millis(200),
    )
    .await;
    app.container.start().await.unwrap();

    let owner = owner();
    seed_credits(&app, &owner, 200).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("block".into()), "en", "Achernar")
        .await
        .unwrap();

    wait_for_status(&app, &task.id, TaskStatus::Failed).await;

    let finished = app.container.task_repo.get_task(&task.id).await.unwrap();
    assert!(
        finished
            .error_message
            .as_deref()
            .unwrap()
            .contains("timed out")
    );
    assert_eq!(app.container.ledger.available(&owner).await.unwrap(), 200);

    app.container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_a_processing_task_frees_credit_and_slot_immediately() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    app.container.start().await.unwrap();

    let owner = owner();
    seed_credits(&app, &owner, 200).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, TaskInput::Text("block".into()), "en", "Achernar")
        .await
        .unwrap();

    // Wait until an executor owns the task.
    wait_for_status(&app, &task.id, TaskStatus::Processing).await;

    let cancelled = app.container.scheduler.cancel(&task.id, &owner).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled.as_str());
    assert_eq!(app.container.ledger.available(&owner).await.unwrap(), 200);
    assert_eq!(
        app.container.task_repo.count_active(&owner).await.unwrap(),
        0
    );

    // The executor's own wind-down must not overwrite the terminal state or
    // charge anything.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = app.container.task_repo.get_task(&task.id).await.unwrap();
    assert_eq!(settled.status, TaskStatus::Cancelled.as_str());
    assert!(consume_entries(&app, &owner).await.is_empty());

    app.container.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backlog_drains_in_creation_order() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;

    let first = owner();
    let second = owner();
    seed_credits(&app, &first, 100).await;
    seed_credits(&app, &second, 100).await;

    // Admit before any executor runs.
    let a = app
        .container
        .scheduler
        .submit(&first, TaskInput::Text("one".into()), "en", "Achernar")
        .await
        .unwrap();
    let b = app
        .container
        .scheduler
        .submit(&second, TaskInput::Text("two".into()), "en", "Achernar")
        .await
        .unwrap();

    app.container.start().await.unwrap();
    wait_for_status(&app, &a.id, TaskStatus::Completed).await;
    wait_for_status(&app, &b.id, TaskStatus::Completed).await;

    let a_done = app.container.task_repo.get_task(&a.id).await.unwrap();
    let b_done = app.container.task_repo.get_task(&b.id).await.unwrap();
    assert!(a_done.settled_at.is_some());
    assert!(b_done.settled_at.is_some());

    app.container.shutdown().await;
}
