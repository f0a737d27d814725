//! Admission control: concurrency limits and credit reservations.
//!
//! The worker pool is deliberately not started here, so admitted tasks stay
//! PENDING and keep their holds.

mod common;

use std::sync::Arc;

use common::{owner, seed_credits, set_plan, spawn_app, ScriptedPipeline};
use vividcast::database::models::{TaskFilters, TaskInput, TaskStatus};
use vividcast::Error;

fn text_input(words: &str) -> TaskInput {
    TaskInput::Text(words.to_string())
}

// A short text prices at the 3-segment minimum: 3 x 30 credits.
const SHORT_TEXT_COST: i64 = 90;

#[tokio::test]
async fn submit_reserves_credits_and_enforces_free_tier_limit() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, 100).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, text_input("a short note"), "en", "Achernar")
        .await
        .expect("first submission admitted");

    assert_eq!(task.status, TaskStatus::Pending.as_str());
    assert_eq!(task.reserved_credits, SHORT_TEXT_COST);
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 100);
    assert_eq!(
        app.container.ledger.available(&owner).await.unwrap(),
        100 - SHORT_TEXT_COST
    );

    // Free tier allows one unfinished task; reject before touching credit.
    let err = app
        .container
        .scheduler
        .submit(&owner, text_input("another note"), "en", "Achernar")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyLimitExceeded { limit: 1 }));
    assert_eq!(
        app.container.ledger.outstanding(&owner),
        SHORT_TEXT_COST,
        "rejected submission must not add a hold"
    );

    let count = app
        .container
        .task_repo
        .count_tasks(&owner, &TaskFilters::default())
        .await
        .unwrap();
    assert_eq!(count, 1, "rejected submission must not create a task");
}

#[tokio::test]
async fn submit_with_insufficient_credit_creates_nothing() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, SHORT_TEXT_COST - 1).await;

    let err = app
        .container
        .scheduler
        .submit(&owner, text_input("a short note"), "en", "Achernar")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientCredit {
            required: SHORT_TEXT_COST,
            available
        } if available == SHORT_TEXT_COST - 1
    ));

    let count = app
        .container
        .task_repo
        .count_tasks(&owner, &TaskFilters::default())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(app.container.ledger.outstanding(&owner), 0);
    assert_eq!(
        app.container.ledger.balance(&owner).await.unwrap(),
        SHORT_TEXT_COST - 1
    );
}

#[tokio::test]
async fn holds_gate_the_second_submission() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    set_plan(&app, &owner, "PRO").await;
    seed_credits(&app, &owner, 100).await;

    app.container
        .scheduler
        .submit(&owner, text_input("first"), "en", "Achernar")
        .await
        .expect("first admitted");

    // 10 credits remain available; the next task needs 90 again.
    let err = app
        .container
        .scheduler
        .submit(&owner, text_input("second"), "en", "Achernar")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientCredit { available: 10, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_respect_the_limit() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    set_plan(&app, &owner, "PRO").await;
    seed_credits(&app, &owner, 10_000).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let scheduler = app.container.scheduler.clone();
        let owner = owner.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .submit(&owner, TaskInput::Text(format!("note {i}")), "en", "Achernar")
                .await
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::ConcurrencyLimitExceeded { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 5, "PRO tier admits exactly its concurrency limit");
    assert_eq!(rejected, 5);
    assert_eq!(
        app.container.task_repo.count_active(&owner).await.unwrap(),
        5
    );
    assert_eq!(app.container.ledger.outstanding(&owner), 5 * SHORT_TEXT_COST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_cannot_overdraw_credit() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    set_plan(&app, &owner, "PRO").await;
    // Enough for exactly one short-text reservation.
    seed_credits(&app, &owner, 100).await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let scheduler = app.container.scheduler.clone();
        let owner = owner.clone();
        handles.push(tokio::spawn(async move {
            scheduler
                .submit(&owner, TaskInput::Text(format!("note {i}")), "en", "Achernar")
                .await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::InsufficientCredit { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 1, "only one reservation fits the balance");
    assert!(app.container.ledger.available(&owner).await.unwrap() >= 0);
}

#[tokio::test]
async fn cancel_pending_releases_hold_and_slot() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, 100).await;

    let task = app
        .container
        .scheduler
        .submit(&owner, text_input("to be cancelled"), "en", "Achernar")
        .await
        .unwrap();

    let cancelled = app.container.scheduler.cancel(&task.id, &owner).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled.as_str());
    assert!(cancelled.output_ref.is_none());
    assert_eq!(app.container.ledger.available(&owner).await.unwrap(), 100);
    assert_eq!(
        app.container.task_repo.count_active(&owner).await.unwrap(),
        0
    );

    // The slot is free again.
    app.container
        .scheduler
        .submit(&owner, text_input("replacement"), "en", "Achernar")
        .await
        .expect("slot freed by cancellation");

    // Cancelling twice reports the terminal state.
    let err = app
        .container
        .scheduler
        .cancel(&task.id, &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn submissions_validate_language_and_voice() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();
    seed_credits(&app, &owner, 1000).await;

    let err = app
        .container
        .scheduler
        .submit(&owner, text_input("note"), "klingon", "Achernar")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = app
        .container
        .scheduler
        .submit(&owner, text_input("note"), "en", "mike")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Validation failures never reserve credit.
    assert_eq!(app.container.ledger.outstanding(&owner), 0);
}

#[tokio::test]
async fn tasks_are_scoped_to_their_owner() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let alice = owner();
    let mallory = owner();
    seed_credits(&app, &alice, 100).await;

    let task = app
        .container
        .scheduler
        .submit(&alice, text_input("private"), "en", "Achernar")
        .await
        .unwrap();

    let err = app
        .container
        .scheduler
        .get_task(&task.id, &mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = app
        .container
        .scheduler
        .cancel(&task.id, &mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
