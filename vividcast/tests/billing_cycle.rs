//! Billing cycles: idempotent monthly grants, reclaim-then-grant rollover,
//! subscription sweeps and payment confirmations.

mod common;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Months, Utc};
use common::{owner, spawn_app, ScriptedPipeline};
use vividcast::database::models::{
    LedgerEntryKind, SubscriptionDbModel, SubscriptionStatus,
};
use vividcast::domain::plan::{BillingPeriod, PlanTier};

#[tokio::test]
async fn duplicate_cycle_triggers_grant_once() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    app.container
        .payment_service
        .on_payment_confirmed(&owner, PlanTier::Basic, BillingPeriod::Monthly, "txn-1")
        .await
        .unwrap();
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 1000);

    // The daily trigger fires again inside the same period.
    let report = app.container.billing_runner.run_cycle().await.unwrap();
    assert_eq!(report.granted, 0);
    assert_eq!(report.skipped, 1);

    let report = app.container.billing_runner.run_cycle().await.unwrap();
    assert_eq!(report.skipped, 1);

    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 1000);
}

#[tokio::test]
async fn next_period_reclaims_unused_credits_before_granting() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    app.container
        .payment_service
        .on_payment_confirmed(&owner, PlanTier::Basic, BillingPeriod::Yearly, "txn-1")
        .await
        .unwrap();

    // 400 credits spent during the period.
    app.container
        .ledger
        .append(&owner, LedgerEntryKind::AdminAdjust, -400, "simulated spend")
        .await
        .unwrap();
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 600);

    let next_month = Utc::now().checked_add_months(Months::new(1)).unwrap();
    let report = app
        .container
        .billing_runner
        .run_cycle_at(next_month)
        .await
        .unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.granted, 1);

    // The 600 unused credits were cleared, then 1000 granted anew.
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 1000);

    let entries = app
        .container
        .ledger_repo
        .list_entries_chronological(&owner)
        .await
        .unwrap();
    let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "MONTHLY_GRANT",
            "ADMIN_ADJUST",
            "MONTHLY_RECLAIM",
            "MONTHLY_GRANT"
        ]
    );
    let reclaim = &entries[2];
    assert_eq!(reclaim.amount, -600);

    // Replays inside the new period change nothing.
    let report = app
        .container
        .billing_runner
        .run_cycle_at(next_month)
        .await
        .unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.granted, 0);
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 1000);
}

#[tokio::test]
async fn payment_confirmation_is_idempotent_by_transaction_id() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    let applied = app
        .container
        .payment_service
        .on_payment_confirmed(&owner, PlanTier::Pro, BillingPeriod::Monthly, "txn-42")
        .await
        .unwrap();
    assert!(applied);

    let replayed = app
        .container
        .payment_service
        .on_payment_confirmed(&owner, PlanTier::Pro, BillingPeriod::Monthly, "txn-42")
        .await
        .unwrap();
    assert!(!replayed);

    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 2200);
    let account = app.container.account_repo.get_account(&owner).await.unwrap();
    assert_eq!(account.plan_tier, "PRO");

    let active = app
        .container
        .subscription_repo
        .get_active_for_owner(&owner)
        .await
        .unwrap();
    assert!(active.is_some());
}

#[tokio::test]
async fn cycle_expires_overdue_subscriptions_and_downgrades_the_tier() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    app.container
        .account_repo
        .get_or_create(&owner)
        .await
        .unwrap();
    app.container
        .account_repo
        .set_plan_tier(&owner, "BASIC")
        .await
        .unwrap();

    let mut subscription = SubscriptionDbModel::new(&owner, "BASIC", "MONTHLY", 1000);
    subscription.status = SubscriptionStatus::Active.as_str().to_string();
    subscription.start_date = Some((Utc::now() - ChronoDuration::days(40)).to_rfc3339());
    subscription.end_date = Some((Utc::now() - ChronoDuration::days(9)).to_rfc3339());
    app.container
        .subscription_repo
        .create_subscription(&subscription)
        .await
        .unwrap();

    let report = app.container.billing_runner.run_cycle().await.unwrap();
    assert_eq!(report.expired, 1);
    // No grant for an expired subscription.
    assert_eq!(report.granted, 0);

    let stored = app
        .container
        .subscription_repo
        .get_subscription(&subscription.id)
        .await
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired.as_str());

    let account = app.container.account_repo.get_account(&owner).await.unwrap();
    assert_eq!(account.plan_tier, "FREE");
}

#[tokio::test]
async fn cycle_drops_stale_pending_subscriptions() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    let mut stale = SubscriptionDbModel::new(&owner, "BASIC", "MONTHLY", 1000);
    stale.created_at = (Utc::now() - ChronoDuration::hours(30)).to_rfc3339();
    app.container
        .subscription_repo
        .create_subscription(&stale)
        .await
        .unwrap();

    let mut fresh = SubscriptionDbModel::new(&owner, "BASIC", "MONTHLY", 1000);
    fresh.created_at = (Utc::now() - ChronoDuration::hours(2)).to_rfc3339();
    app.container
        .subscription_repo
        .create_subscription(&fresh)
        .await
        .unwrap();

    let report = app.container.billing_runner.run_cycle().await.unwrap();
    assert_eq!(report.deleted_pending, 1);

    let stored = app
        .container
        .subscription_repo
        .get_subscription(&stale.id)
        .await
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Deleted.as_str());

    let stored = app
        .container
        .subscription_repo
        .get_subscription(&fresh.id)
        .await
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Pending.as_str());
}

#[tokio::test]
async fn provider_cancellation_keeps_the_subscription_until_period_end() {
    let app = spawn_app(Arc::new(ScriptedPipeline::default())).await;
    let owner = owner();

    app.container
        .payment_service
        .on_payment_confirmed(&owner, PlanTier::Basic, BillingPeriod::Monthly, "txn-7")
        .await
        .unwrap();

    let applied = app
        .container
        .payment_service
        .on_subscription_cancelled(&owner)
        .await
        .unwrap();
    assert!(applied);

    // Nothing active remains; a second cancellation is a no-op.
    let applied = app
        .container
        .payment_service
        .on_subscription_cancelled(&owner)
        .await
        .unwrap();
    assert!(!applied);

    // The already-granted period's credits are untouched.
    assert_eq!(app.container.ledger.balance(&owner).await.unwrap(), 1000);
}
