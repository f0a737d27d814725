//! Subscription repository.

use async_trait::async_trait;

use crate::database::models::{SubscriptionDbModel, SubscriptionStatus};
use crate::database::retry::with_busy_retry;
use crate::database::{DbPool, WritePool};
use crate::{Error, Result};

/// Subscription repository trait.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_subscription(&self, id: &str) -> Result<SubscriptionDbModel>;
    async fn create_subscription(&self, subscription: &SubscriptionDbModel) -> Result<()>;
    /// The owner's current ACTIVE subscription, if any.
    async fn get_active_for_owner(&self, owner_id: &str) -> Result<Option<SubscriptionDbModel>>;
    /// All ACTIVE subscriptions, for the billing cycle runner.
    async fn list_active(&self) -> Result<Vec<SubscriptionDbModel>>;
    /// ACTIVE subscriptions already past their end date.
    async fn list_overdue_active(&self, now: &str) -> Result<Vec<SubscriptionDbModel>>;
    /// Mark a subscription cancelled; it stays usable until its end date.
    async fn cancel(&self, id: &str) -> Result<()>;
    /// ACTIVE subscriptions past their end date become EXPIRED.
    async fn expire_overdue(&self, now: &str) -> Result<i64>;
    /// PENDING subscriptions older than the cutoff become DELETED.
    async fn delete_stale_pending(&self, cutoff: &str) -> Result<i64>;
}

/// SQLx implementation of SubscriptionRepository.
pub struct SqlxSubscriptionRepository {
    pool: DbPool,
    write_pool: WritePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DbPool, write_pool: WritePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn get_subscription(&self, id: &str) -> Result<SubscriptionDbModel> {
        sqlx::query_as::<_, SubscriptionDbModel>("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Subscription", id))
    }

    async fn create_subscription(&self, subscription: &SubscriptionDbModel) -> Result<()> {
        let subscription = subscription.clone();
        with_busy_retry("create_subscription", || {
            let sub = subscription.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO subscriptions (
                        id, owner_id, tier, period, status, monthly_credits,
                        start_date, end_date, created_at, updated_at, cancelled_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&sub.id)
                .bind(&sub.owner_id)
                .bind(&sub.tier)
                .bind(&sub.period)
                .bind(&sub.status)
                .bind(sub.monthly_credits)
                .bind(&sub.start_date)
                .bind(&sub.end_date)
                .bind(&sub.created_at)
                .bind(&sub.updated_at)
                .bind(&sub.cancelled_at)
                .execute(&self.write_pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    async fn get_active_for_owner(&self, owner_id: &str) -> Result<Option<SubscriptionDbModel>> {
        let subscription = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM subscriptions WHERE owner_id = ? AND status = 'ACTIVE' \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn list_active(&self) -> Result<Vec<SubscriptionDbModel>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM subscriptions WHERE status = 'ACTIVE' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn list_overdue_active(&self, now: &str) -> Result<Vec<SubscriptionDbModel>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM subscriptions WHERE status = 'ACTIVE' \
             AND end_date IS NOT NULL AND end_date <= ? ORDER BY created_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        with_busy_retry("cancel_subscription", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE subscriptions SET status = ?, cancelled_at = ?, updated_at = ? \
                 WHERE id = ? AND status = 'ACTIVE'",
            )
            .bind(SubscriptionStatus::Cancelled.as_str())
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.write_pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn expire_overdue(&self, now: &str) -> Result<i64> {
        with_busy_retry("expire_overdue", || async {
            let updated_at = chrono::Utc::now().to_rfc3339();
            let result = sqlx::query(
                "UPDATE subscriptions SET status = 'EXPIRED', updated_at = ? \
                 WHERE status = 'ACTIVE' AND end_date IS NOT NULL AND end_date <= ?",
            )
            .bind(&updated_at)
            .bind(now)
            .execute(&self.write_pool)
            .await?;
            Ok(result.rows_affected() as i64)
        })
        .await
    }

    async fn delete_stale_pending(&self, cutoff: &str) -> Result<i64> {
        with_busy_retry("delete_stale_pending", || async {
            let now = chrono::Utc::now().to_rfc3339();
            let result = sqlx::query(
                "UPDATE subscriptions SET status = 'DELETED', cancelled_at = ?, updated_at = ? \
                 WHERE status = 'PENDING' AND created_at < ?",
            )
            .bind(&now)
            .bind(&now)
            .bind(cutoff)
            .execute(&self.write_pool)
            .await?;
            Ok(result.rows_affected() as i64)
        })
        .await
    }
}
