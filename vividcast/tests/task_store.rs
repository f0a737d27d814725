//! Task store semantics: idempotent transitions, guarded progress writes,
//! FIFO claims with no double-claim under contention.

mod common;

use std::sync::Arc;

use common::{owner, seed_credits, spawn_app, ScriptedPipeline};
use vividcast::database::models::{TaskInput, TaskStatus};

async fn admit_one(app: &common::TestApp, owner_id: &str, text: &str) -> String {
    app.container
        .scheduler
        .submit(owner_id, TaskInput::Text(text.to_string()), "en", "Achernar")
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn transition_is_idempotent_once_terminal() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, 100).await;
    let task_id = admit_one(&app, &owner, "note").await;

    let repo = &app.container.task_repo;
    assert!(repo.claim_next_pending().await.unwrap().is_some());

    let applied = repo
        .transition(&task_id, TaskStatus::Completed, Some("outputs/x.mp4"), None)
        .await
        .unwrap();
    assert!(applied);

    // A duplicate completion callback is a no-op.
    let applied = repo
        .transition(&task_id, TaskStatus::Completed, Some("outputs/y.mp4"), None)
        .await
        .unwrap();
    assert!(!applied);

    // So is a late failure report.
    let applied = repo
        .transition(&task_id, TaskStatus::Failed, None, Some("too late"))
        .await
        .unwrap();
    assert!(!applied);

    let task = repo.get_task(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed.as_str());
    assert_eq!(task.output_ref.as_deref(), Some("outputs/x.mp4"));
    assert!(task.error_message.is_none());
}

#[tokio::test]
async fn progress_is_monotonic_and_only_while_processing() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, 100).await;
    let task_id = admit_one(&app, &owner, "note").await;

    let repo = &app.container.task_repo;

    // Not yet processing: progress writes are ignored.
    assert!(!repo.update_progress(&task_id, 10).await.unwrap());

    repo.claim_next_pending().await.unwrap().unwrap();
    assert!(repo.update_progress(&task_id, 40).await.unwrap());
    // Backwards and duplicate reports are dropped.
    assert!(!repo.update_progress(&task_id, 40).await.unwrap());
    assert!(!repo.update_progress(&task_id, 25).await.unwrap());
    assert!(repo.update_progress(&task_id, 90).await.unwrap());

    repo.transition(&task_id, TaskStatus::Failed, None, Some("boom"))
        .await
        .unwrap();
    assert!(!repo.update_progress(&task_id, 99).await.unwrap());

    let task = repo.get_task(&task_id).await.unwrap();
    assert_eq!(task.progress, 90);
}

#[tokio::test]
async fn claims_come_out_in_creation_order() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let first = owner();
    let second = owner();
    seed_credits(&app, &first, 100).await;
    seed_credits(&app, &second, 100).await;

    let a = admit_one(&app, &first, "a").await;
    let b = admit_one(&app, &second, "b").await;

    let repo = &app.container.task_repo;
    let claimed_a = repo.claim_next_pending().await.unwrap().unwrap();
    let claimed_b = repo.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(claimed_a.id, a);
    assert_eq!(claimed_b.id, b);
    assert_eq!(claimed_a.status, TaskStatus::Processing.as_str());
    assert!(repo.claim_next_pending().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_never_hand_out_the_same_task() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;

    // A backlog spread over many owners.
    for i in 0..20 {
        let owner = owner();
        seed_credits(&app, &owner, 100).await;
        admit_one(&app, &owner, &format!("note {i}")).await;
    }

    let claimed = Arc::new(dashmap::DashSet::<String>::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = app.container.task_repo.clone();
        let claimed = claimed.clone();
        handles.push(tokio::spawn(async move {
            while let Some(task) = repo.claim_next_pending().await.unwrap() {
                assert!(claimed.insert(task.id.clone()), "double claim: {}", task.id);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(claimed.len(), 20);
}
