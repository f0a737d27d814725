//! Credit ledger repository (read side and code administration).
//!
//! Balance-changing writes never go through this repository; they run inside
//! immediate write transactions via [`super::LedgerTxOps`] so the account
//! balance and the appended entry commit together.

use async_trait::async_trait;

use crate::database::models::{LedgerEntryDbModel, RedeemCodeDbModel};
use crate::database::retry::with_busy_retry;
use crate::database::{DbPool, WritePool};
use crate::Result;

/// Ledger repository trait.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Entries for an owner, newest first.
    async fn list_entries(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntryDbModel>>;
    /// All entries for an owner in creation order, for replay checks.
    async fn list_entries_chronological(&self, owner_id: &str) -> Result<Vec<LedgerEntryDbModel>>;
    /// Register a redeem code (operator surface).
    async fn create_redeem_code(&self, code: &RedeemCodeDbModel) -> Result<()>;
}

/// SQLx implementation of LedgerRepository.
pub struct SqlxLedgerRepository {
    pool: DbPool,
    write_pool: WritePool,
}

impl SqlxLedgerRepository {
    pub fn new(pool: DbPool, write_pool: WritePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl LedgerRepository for SqlxLedgerRepository {
    async fn list_entries(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntryDbModel>> {
        let entries = sqlx::query_as::<_, LedgerEntryDbModel>(
            "SELECT * FROM credit_ledger WHERE owner_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn list_entries_chronological(&self, owner_id: &str) -> Result<Vec<LedgerEntryDbModel>> {
        let entries = sqlx::query_as::<_, LedgerEntryDbModel>(
            "SELECT * FROM credit_ledger WHERE owner_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn create_redeem_code(&self, code: &RedeemCodeDbModel) -> Result<()> {
        let code = code.clone();
        with_busy_retry("create_redeem_code", || {
            let code = code.clone();
            async move {
                sqlx::query(
                    "INSERT INTO redeem_codes \
                     (id, code, credit_amount, is_used, used_by, used_at, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&code.id)
                .bind(&code.code)
                .bind(code.credit_amount)
                .bind(code.is_used)
                .bind(&code.used_by)
                .bind(&code.used_at)
                .bind(&code.created_at)
                .bind(&code.updated_at)
                .execute(&self.write_pool)
                .await?;
                Ok(())
            }
        })
        .await
    }
}
