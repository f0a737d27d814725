//! Billing cycle runner.
//!
//! Fires on a cron schedule (daily by default; the monthly markers make the
//! extra firings no-ops) and, per active subscription, clears the unused
//! remainder of the previous period's grant before granting the new
//! period's credits. Also sweeps overdue and abandoned subscriptions.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::database::models::LedgerEntryKind;
use crate::database::repositories::{AccountRepository, SubscriptionRepository};
use crate::domain::plan::PlanTier;
use crate::ledger::Ledger;
use crate::{Error, Result};

/// Hours a PENDING subscription may wait for payment before being dropped.
const STALE_PENDING_HOURS: i64 = 24;

/// Summary of one billing cycle pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub granted: usize,
    pub skipped: usize,
    pub reclaimed: usize,
    pub expired: i64,
    pub deleted_pending: i64,
    pub errors: usize,
}

/// Periodic billing job.
pub struct BillingCycleRunner {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    account_repo: Arc<dyn AccountRepository>,
    ledger: Arc<Ledger>,
    schedule: cron::Schedule,
    cancellation_token: CancellationToken,
}

impl BillingCycleRunner {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        account_repo: Arc<dyn AccountRepository>,
        ledger: Arc<Ledger>,
        schedule: &str,
    ) -> Result<Self> {
        let schedule = cron::Schedule::from_str(schedule)
            .map_err(|e| Error::config(format!("invalid billing schedule: {e}")))?;
        Ok(Self {
            subscription_repo,
            account_repo,
            ledger,
            schedule,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Spawn the periodic loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Some(next) = self.schedule.upcoming(Utc).next() else {
                    error!("billing schedule yields no upcoming fire time, runner stopping");
                    break;
                };
                let wait = (next - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);

                tokio::select! {
                    _ = self.cancellation_token.cancelled() => {
                        info!("billing cycle runner stopped");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                if let Err(e) = self.run_cycle().await {
                    error!("billing cycle failed: {e}");
                }
            }
        })
    }

    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    /// Run one cycle at the current time.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `now`. Idempotent per calendar month: duplicate
    /// triggers inside a period change nothing.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let now_str = now.to_rfc3339();
        let period_key = now.format("%Y-%m").to_string();

        // Owners whose last active subscription lapses drop to the free tier.
        let overdue = self.subscription_repo.list_overdue_active(&now_str).await?;
        report.expired = self.subscription_repo.expire_overdue(&now_str).await?;
        for subscription in &overdue {
            let still_active = self
                .subscription_repo
                .get_active_for_owner(&subscription.owner_id)
                .await?;
            if still_active.is_none()
                && let Err(e) = self
                    .account_repo
                    .set_plan_tier(&subscription.owner_id, PlanTier::Free.as_str())
                    .await
            {
                report.errors += 1;
                error!(owner_id = %subscription.owner_id, "failed to downgrade plan tier: {e}");
            }
        }

        let stale_cutoff = (now - ChronoDuration::hours(STALE_PENDING_HOURS)).to_rfc3339();
        report.deleted_pending = self
            .subscription_repo
            .delete_stale_pending(&stale_cutoff)
            .await?;

        for subscription in self.subscription_repo.list_active().await? {
            let owner_id = &subscription.owner_id;

            match self.ledger.reclaim_unused_grant(owner_id, &period_key).await {
                Ok(Some(_)) => report.reclaimed += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    error!(
                        subscription_id = %subscription.id,
                        "failed to reclaim credits: {e}"
                    );
                    continue;
                }
            }

            match self
                .ledger
                .grant_once(
                    owner_id,
                    LedgerEntryKind::MonthlyGrant,
                    subscription.monthly_credits,
                    &period_key,
                    format!("monthly grant {} credits", subscription.monthly_credits),
                )
                .await
            {
                Ok(Some(_)) => report.granted += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(
                        subscription_id = %subscription.id,
                        "failed to grant monthly credits: {e}"
                    );
                }
            }
        }

        info!(
            granted = report.granted,
            skipped = report.skipped,
            reclaimed = report.reclaimed,
            expired = report.expired,
            deleted_pending = report.deleted_pending,
            errors = report.errors,
            "billing cycle completed"
        );

        Ok(report)
    }
}
