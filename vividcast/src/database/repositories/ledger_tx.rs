//! Transactional operations for the credit ledger.
//!
//! These methods operate within an existing immediate transaction and do NOT
//! commit. The caller is responsible for committing or rolling back; the
//! account balance update and the appended ledger entry must always land in
//! the same transaction to preserve the replay invariant.

use sqlx::{Row, SqliteConnection};

use crate::database::models::{LedgerEntryDbModel, RedeemCodeDbModel};
use crate::Result;

/// Transactional operations for accounts, ledger entries and billing markers.
pub struct LedgerTxOps;

impl LedgerTxOps {
    /// Read the stored balance for an owner inside the transaction.
    pub async fn balance(tx: &mut SqliteConnection, owner_id: &str) -> Result<Option<i64>> {
        let balance = sqlx::query("SELECT credit_balance FROM accounts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(tx)
            .await?
            .map(|row| row.get::<i64, _>("credit_balance"));
        Ok(balance)
    }

    /// Ensure an account row exists for the owner.
    pub async fn ensure_account(tx: &mut SqliteConnection, owner_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO accounts (owner_id, credit_balance, plan_tier, created_at, updated_at) \
             VALUES (?, 0, 'FREE', ?, ?) ON CONFLICT(owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// Append a ledger entry and move the account balance to
    /// `entry.balance_after` in one step.
    pub async fn apply_entry(tx: &mut SqliteConnection, entry: &LedgerEntryDbModel) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE accounts SET credit_balance = ?, updated_at = ? WHERE owner_id = ?")
            .bind(entry.balance_after)
            .bind(&now)
            .bind(&entry.owner_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO credit_ledger \
             (id, owner_id, kind, amount, balance_after, task_id, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.owner_id)
        .bind(&entry.kind)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(&entry.task_id)
        .bind(&entry.description)
        .bind(&entry.created_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// Check-and-set a billing period marker. Returns false when the marker
    /// already existed, in which case the caller must skip the ledger effect.
    pub async fn try_insert_marker(
        tx: &mut SqliteConnection,
        owner_id: &str,
        kind: &str,
        period_key: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO billing_period_markers (owner_id, kind, period_key, applied_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(kind)
        .bind(period_key)
        .bind(&now)
        .execute(tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Most recent entry of a given kind for an owner, inside the
    /// transaction.
    pub async fn last_entry_of_kind(
        tx: &mut SqliteConnection,
        owner_id: &str,
        kind: &str,
    ) -> Result<Option<LedgerEntryDbModel>> {
        let entry = sqlx::query_as::<_, LedgerEntryDbModel>(
            "SELECT * FROM credit_ledger WHERE owner_id = ? AND kind = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(owner_id)
        .bind(kind)
        .fetch_optional(tx)
        .await?;
        Ok(entry)
    }

    /// Look up a redeem code inside the transaction.
    pub async fn get_redeem_code(
        tx: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<RedeemCodeDbModel>> {
        let row = sqlx::query_as::<_, RedeemCodeDbModel>(
            "SELECT * FROM redeem_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(tx)
        .await?;
        Ok(row)
    }

    /// Mark a code as consumed by an owner. Returns false if another
    /// redemption won the race.
    pub async fn mark_code_used(
        tx: &mut SqliteConnection,
        code_id: &str,
        owner_id: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE redeem_codes SET is_used = 1, used_by = ?, used_at = ?, updated_at = ? \
             WHERE id = ? AND is_used = 0",
        )
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .bind(code_id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the owner already redeemed a code of the given amount.
    pub async fn has_redeemed_amount(
        tx: &mut SqliteConnection,
        owner_id: &str,
        amount: i64,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM credit_ledger WHERE owner_id = ? AND kind = 'REDEEM' AND amount = ? \
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(amount)
        .fetch_optional(tx)
        .await?;
        Ok(row.is_some())
    }

    /// Stamp a task as settled. Returns false when the task was already
    /// settled, making settlement retries no-ops.
    pub async fn stamp_task_settled(tx: &mut SqliteConnection, task_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE tasks SET settled_at = ?, updated_at = ? \
             WHERE id = ? AND settled_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(task_id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a payment-provider confirmation. Returns false when the
    /// provider transaction id was seen before.
    pub async fn try_insert_payment_event(
        tx: &mut SqliteConnection,
        provider_txn_id: &str,
        owner_id: &str,
        tier: &str,
        period: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO payment_events \
             (provider_txn_id, owner_id, tier, period, received_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(provider_txn_id)
        .bind(owner_id)
        .bind(tier)
        .bind(period)
        .bind(&now)
        .execute(tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
