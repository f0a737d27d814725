//! Account repository.

use async_trait::async_trait;

use crate::database::models::AccountDbModel;
use crate::database::retry::with_busy_retry;
use crate::database::{DbPool, WritePool};
use crate::{Error, Result};

/// Account repository trait.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account(&self, owner_id: &str) -> Result<AccountDbModel>;
    /// Fetch the account, creating an empty FREE-tier row on first touch.
    async fn get_or_create(&self, owner_id: &str) -> Result<AccountDbModel>;
    async fn set_plan_tier(&self, owner_id: &str, tier: &str) -> Result<()>;
}

/// SQLx implementation of AccountRepository.
pub struct SqlxAccountRepository {
    pool: DbPool,
    write_pool: WritePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: DbPool, write_pool: WritePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn get_account(&self, owner_id: &str) -> Result<AccountDbModel> {
        sqlx::query_as::<_, AccountDbModel>("SELECT * FROM accounts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Account", owner_id))
    }

    async fn get_or_create(&self, owner_id: &str) -> Result<AccountDbModel> {
        let account = AccountDbModel::new(owner_id);
        with_busy_retry("account_upsert", || {
            let account = account.clone();
            async move {
                sqlx::query(
                    "INSERT INTO accounts (owner_id, credit_balance, plan_tier, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?) ON CONFLICT(owner_id) DO NOTHING",
                )
                .bind(&account.owner_id)
                .bind(account.credit_balance)
                .bind(&account.plan_tier)
                .bind(&account.created_at)
                .bind(&account.updated_at)
                .execute(&self.write_pool)
                .await?;
                Ok(())
            }
        })
        .await?;

        self.get_account(owner_id).await
    }

    async fn set_plan_tier(&self, owner_id: &str, tier: &str) -> Result<()> {
        with_busy_retry("set_plan_tier", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query("UPDATE accounts SET plan_tier = ?, updated_at = ? WHERE owner_id = ?")
                .bind(tier)
                .bind(&now)
                .bind(owner_id)
                .execute(&self.write_pool)
                .await?;
            Ok(())
        })
        .await
    }
}
