//! Payment-provider confirmations.
//!
//! The fronting webhook layer verifies provider signatures; this service
//! receives the decoded confirmation. Idempotency key is the provider's
//! transaction id: every ledger and subscription effect below is itself
//! idempotent, and the event row is recorded last, so an interrupted
//! confirmation is safely re-applied by the provider's retry.

use std::sync::Arc;

use chrono::{Months, Utc};
use tracing::info;

use crate::database::models::{LedgerEntryKind, SubscriptionDbModel, SubscriptionStatus};
use crate::database::repositories::{
    AccountRepository, LedgerTxOps, SubscriptionRepository,
};
use crate::database::retry::with_busy_retry;
use crate::database::{begin_immediate, DbPool, WritePool};
use crate::domain::plan::{plan_for, BillingPeriod, PlanTier};
use crate::ledger::Ledger;
use crate::{Error, Result};

/// Payment confirmation handling.
pub struct PaymentService {
    pool: DbPool,
    write_pool: WritePool,
    account_repo: Arc<dyn AccountRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    ledger: Arc<Ledger>,
}

impl PaymentService {
    pub fn new(
        pool: DbPool,
        write_pool: WritePool,
        account_repo: Arc<dyn AccountRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        ledger: Arc<Ledger>,
    ) -> Self {
        Self {
            pool,
            write_pool,
            account_repo,
            subscription_repo,
            ledger,
        }
    }

    /// Apply a confirmed payment: activate the subscription, switch the
    /// account's plan tier, and grant the first period's credits. Returns
    /// false for a replayed provider transaction id.
    pub async fn on_payment_confirmed(
        &self,
        owner_id: &str,
        tier: PlanTier,
        period: BillingPeriod,
        provider_txn_id: &str,
    ) -> Result<bool> {
        if tier == PlanTier::Free {
            return Err(Error::validation("payments cannot target the free tier"));
        }
        if provider_txn_id.trim().is_empty() {
            return Err(Error::validation("missing provider transaction id"));
        }

        let seen: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM payment_events WHERE provider_txn_id = ?")
                .bind(provider_txn_id)
                .fetch_optional(&self.pool)
                .await?;
        if seen.is_some() {
            info!(provider_txn_id, "payment confirmation replayed, ignoring");
            return Ok(false);
        }

        let plan = plan_for(tier);
        let now = Utc::now();
        let end = now
            .checked_add_months(Months::new(period.months()))
            .unwrap_or(now);

        self.account_repo.get_or_create(owner_id).await?;
        self.account_repo
            .set_plan_tier(owner_id, tier.as_str())
            .await?;

        let mut subscription = SubscriptionDbModel::new(
            owner_id,
            tier.as_str(),
            period.as_str(),
            plan.monthly_credits,
        );
        subscription.status = SubscriptionStatus::Active.as_str().to_string();
        subscription.start_date = Some(now.to_rfc3339());
        subscription.end_date = Some(end.to_rfc3339());
        self.subscription_repo
            .create_subscription(&subscription)
            .await?;

        let period_key = now.format("%Y-%m").to_string();
        self.ledger
            .grant_once(
                owner_id,
                LedgerEntryKind::MonthlyGrant,
                plan.monthly_credits,
                &period_key,
                format!("monthly grant {} credits", plan.monthly_credits),
            )
            .await?;

        with_busy_retry("record_payment_event", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;
            LedgerTxOps::try_insert_payment_event(
                &mut tx,
                provider_txn_id,
                owner_id,
                tier.as_str(),
                period.as_str(),
            )
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!(
            owner_id,
            tier = tier.as_str(),
            period = period.as_str(),
            provider_txn_id,
            "payment confirmed, subscription activated"
        );
        Ok(true)
    }

    /// Cancel the owner's active subscription after a provider cancellation
    /// event. Returns false when there is nothing active to cancel.
    pub async fn on_subscription_cancelled(&self, owner_id: &str) -> Result<bool> {
        let Some(subscription) = self.subscription_repo.get_active_for_owner(owner_id).await?
        else {
            return Ok(false);
        };
        self.subscription_repo.cancel(&subscription.id).await?;
        info!(owner_id, subscription_id = %subscription.id, "subscription cancelled");
        Ok(true)
    }
}
