//! Credit ledger service.
//!
//! The durable balance lives on the account row and always equals the
//! `balance_after` of the owner's latest ledger entry. Reservations are
//! logical holds tracked in memory and rebuilt from non-terminal tasks at
//! startup; a hold becomes a TASK_CONSUME entry only when the task
//! completes, and evaporates without any ledger effect on failure or
//! cancellation.

pub mod locks;

use std::sync::Arc;

use dashmap::DashMap;

use crate::database::models::{LedgerEntryDbModel, LedgerEntryKind};
use crate::database::repositories::LedgerTxOps;
use crate::database::retry::with_busy_retry;
use crate::database::{begin_immediate, DbPool, WritePool};
use crate::{Error, Result};

pub use locks::OwnerLocks;

/// A hold against an owner's balance.
#[derive(Debug, Clone)]
struct Hold {
    owner_id: String,
    amount: i64,
}

/// A successful reservation. The scheduler stores the id on its in-flight
/// registry and hands it back at settlement.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: String,
    pub owner_id: String,
    pub amount: i64,
}

/// Credit ledger service.
pub struct Ledger {
    pool: DbPool,
    write_pool: WritePool,
    locks: Arc<OwnerLocks>,
    /// Reservation id -> hold.
    holds: DashMap<String, Hold>,
    /// Owner -> sum of outstanding holds.
    outstanding: DashMap<String, i64>,
}

impl Ledger {
    pub fn new(pool: DbPool, write_pool: WritePool, locks: Arc<OwnerLocks>) -> Self {
        Self {
            pool,
            write_pool,
            locks,
            holds: DashMap::new(),
            outstanding: DashMap::new(),
        }
    }

    /// The shared owner lock table. The scheduler serializes its admission
    /// path on the same locks.
    pub fn owner_locks(&self) -> Arc<OwnerLocks> {
        self.locks.clone()
    }

    /// Stored balance for an owner (0 for accounts not yet created).
    pub async fn balance(&self, owner_id: &str) -> Result<i64> {
        let balance: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM accounts WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.map(|b| b.0).unwrap_or(0))
    }

    /// Sum of outstanding holds for an owner.
    pub fn outstanding(&self, owner_id: &str) -> i64 {
        self.outstanding.get(owner_id).map(|v| *v).unwrap_or(0)
    }

    /// Balance available for new reservations.
    pub async fn available(&self, owner_id: &str) -> Result<i64> {
        Ok(self.balance(owner_id).await? - self.outstanding(owner_id))
    }

    /// Place a hold of `amount` against the owner's available balance.
    ///
    /// The caller MUST hold the owner's admission lock (`owner_locks()`);
    /// the scheduler acquires it around the concurrency check and this call
    /// so two concurrent submissions cannot both pass on the same credits.
    pub async fn reserve(&self, owner_id: &str, amount: i64) -> Result<Reservation> {
        debug_assert!(amount > 0);
        let available = self.available(owner_id).await?;
        if available < amount {
            return Err(Error::InsufficientCredit {
                required: amount,
                available,
            });
        }

        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            amount,
        };
        self.insert_hold(&reservation.id, owner_id, amount);
        tracing::debug!(
            owner_id,
            amount,
            reservation_id = %reservation.id,
            "credits reserved"
        );
        Ok(reservation)
    }

    /// Re-establish a hold for a task discovered at startup.
    pub fn restore_hold(&self, reservation_id: &str, owner_id: &str, amount: i64) {
        self.insert_hold(reservation_id, owner_id, amount);
    }

    fn insert_hold(&self, reservation_id: &str, owner_id: &str, amount: i64) {
        self.holds.insert(
            reservation_id.to_string(),
            Hold {
                owner_id: owner_id.to_string(),
                amount,
            },
        );
        *self.outstanding.entry(owner_id.to_string()).or_insert(0) += amount;
    }

    /// Release a hold with no ledger effect (failure or cancellation).
    /// Releasing an unknown or already-released reservation is a no-op.
    pub async fn release(&self, reservation_id: &str) {
        let Some(owner_id) = self
            .holds
            .get(reservation_id)
            .map(|h| h.owner_id.clone())
        else {
            return;
        };
        let _guard = self.locks.acquire(&owner_id).await;
        if let Some((_, hold)) = self.holds.remove(reservation_id) {
            if let Some(mut total) = self.outstanding.get_mut(&hold.owner_id) {
                *total -= hold.amount;
            }
            tracing::debug!(
                owner_id = %hold.owner_id,
                amount = hold.amount,
                reservation_id,
                "hold released"
            );
        }
    }

    /// Convert a completed task's reservation into a TASK_CONSUME entry of
    /// exactly the reserved amount.
    ///
    /// Safe to retry: the task's `settled_at` stamp and the partial unique
    /// index on TASK_CONSUME entries turn duplicates into no-ops. Returns
    /// whether this call applied the settlement.
    pub async fn settle_consume(
        &self,
        owner_id: &str,
        task_id: &str,
        amount: i64,
        reservation_id: &str,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(owner_id).await;

        let applied = with_busy_retry("settle_consume", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            if !LedgerTxOps::stamp_task_settled(&mut tx, task_id).await? {
                tx.commit().await?;
                return Ok(false);
            }

            LedgerTxOps::ensure_account(&mut tx, owner_id).await?;
            let balance = LedgerTxOps::balance(&mut tx, owner_id).await?.unwrap_or(0);
            let entry = LedgerEntryDbModel::new(
                owner_id,
                LedgerEntryKind::TaskConsume,
                -amount,
                balance - amount,
            )
            .with_task(task_id)
            .with_description(format!("task {task_id} consume {amount} credits"));
            LedgerTxOps::apply_entry(&mut tx, &entry).await?;

            tx.commit().await?;
            Ok(true)
        })
        .await?;

        // The hold is spent either way once the task is settled.
        if let Some((_, hold)) = self.holds.remove(reservation_id) {
            if let Some(mut total) = self.outstanding.get_mut(&hold.owner_id) {
                *total -= hold.amount;
            }
        }

        if applied {
            tracing::info!(owner_id, task_id, amount, "task settlement applied");
        } else {
            tracing::debug!(owner_id, task_id, "task already settled, skipping");
        }
        Ok(applied)
    }

    /// Append a balance-affecting entry with no idempotency marker.
    ///
    /// Used for PURCHASE / ADMIN_ADJUST / payment-driven grants, whose
    /// duplicate suppression lives with the trigger (e.g. the payment event
    /// table).
    pub async fn append(
        &self,
        owner_id: &str,
        kind: LedgerEntryKind,
        amount: i64,
        description: impl Into<String>,
    ) -> Result<LedgerEntryDbModel> {
        let description = description.into();
        let _guard = self.locks.acquire(owner_id).await;

        with_busy_retry("ledger_append", || {
            let description = description.clone();
            async move {
                let mut tx = begin_immediate(&self.write_pool).await?;
                LedgerTxOps::ensure_account(&mut tx, owner_id).await?;
                let balance = LedgerTxOps::balance(&mut tx, owner_id).await?.unwrap_or(0);
                let entry = LedgerEntryDbModel::new(owner_id, kind, amount, balance + amount)
                    .with_description(description);
                LedgerTxOps::apply_entry(&mut tx, &entry).await?;
                tx.commit().await?;
                Ok(entry)
            }
        })
        .await
    }

    /// Idempotent grant keyed by (owner, kind, period). Returns None when the
    /// period was already applied.
    pub async fn grant_once(
        &self,
        owner_id: &str,
        kind: LedgerEntryKind,
        amount: i64,
        period_key: &str,
        description: impl Into<String>,
    ) -> Result<Option<LedgerEntryDbModel>> {
        let description = description.into();
        let _guard = self.locks.acquire(owner_id).await;

        with_busy_retry("ledger_grant_once", || {
            let description = description.clone();
            async move {
                let mut tx = begin_immediate(&self.write_pool).await?;

                if !LedgerTxOps::try_insert_marker(&mut tx, owner_id, kind.as_str(), period_key)
                    .await?
                {
                    tx.commit().await?;
                    return Ok(None);
                }

                LedgerTxOps::ensure_account(&mut tx, owner_id).await?;
                let balance = LedgerTxOps::balance(&mut tx, owner_id).await?.unwrap_or(0);
                let entry = LedgerEntryDbModel::new(owner_id, kind, amount, balance + amount)
                    .with_description(description);
                LedgerTxOps::apply_entry(&mut tx, &entry).await?;

                tx.commit().await?;
                Ok(Some(entry))
            }
        })
        .await
    }

    /// Claw back the unused part of the previous monthly grant, capped at the
    /// owner's available balance so outstanding holds stay funded. Idempotent
    /// per (owner, MONTHLY_RECLAIM, period).
    pub async fn reclaim_unused_grant(
        &self,
        owner_id: &str,
        period_key: &str,
    ) -> Result<Option<LedgerEntryDbModel>> {
        let _guard = self.locks.acquire(owner_id).await;
        let outstanding = self.outstanding(owner_id);

        with_busy_retry("ledger_reclaim", || async move {
            let mut tx = begin_immediate(&self.write_pool).await?;

            if !LedgerTxOps::try_insert_marker(
                &mut tx,
                owner_id,
                LedgerEntryKind::MonthlyReclaim.as_str(),
                period_key,
            )
            .await?
            {
                tx.commit().await?;
                return Ok(None);
            }

            let last_grant = LedgerTxOps::last_entry_of_kind(
                &mut tx,
                owner_id,
                LedgerEntryKind::MonthlyGrant.as_str(),
            )
            .await?;

            let Some(last_grant) = last_grant.filter(|g| g.amount > 0) else {
                tx.commit().await?;
                return Ok(None);
            };

            // Only a previous period's grant is reclaimable; the current
            // period's own grant (e.g. applied by a payment confirmation
            // earlier in the month) stays.
            if last_grant.created_at.starts_with(period_key) {
                tx.commit().await?;
                return Ok(None);
            }

            let balance = LedgerTxOps::balance(&mut tx, owner_id).await?.unwrap_or(0);
            let available = balance - outstanding;
            let reclaim = last_grant.amount.min(available);
            if reclaim <= 0 {
                tx.commit().await?;
                return Ok(None);
            }

            let entry = LedgerEntryDbModel::new(
                owner_id,
                LedgerEntryKind::MonthlyReclaim,
                -reclaim,
                balance - reclaim,
            )
            .with_description(format!("reclaim {reclaim} unused credits from last period"));
            LedgerTxOps::apply_entry(&mut tx, &entry).await?;

            tx.commit().await?;
            Ok(Some(entry))
        })
        .await
    }

    /// Redeem a single-use code. Standard 1000-credit codes may be used at
    /// most once per owner; other amounts are only bounded by the code
    /// itself.
    pub async fn redeem(&self, owner_id: &str, code: &str) -> Result<i64> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidCode);
        }

        let _guard = self.locks.acquire(owner_id).await;

        with_busy_retry("ledger_redeem", || async move {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let Some(record) = LedgerTxOps::get_redeem_code(&mut tx, code).await? else {
                tx.rollback().await?;
                return Err(Error::InvalidCode);
            };

            if record.is_used != 0 {
                tx.rollback().await?;
                return Err(Error::AlreadyRedeemed);
            }

            if record.credit_amount == 1000
                && LedgerTxOps::has_redeemed_amount(&mut tx, owner_id, 1000).await?
            {
                tx.rollback().await?;
                return Err(Error::AlreadyRedeemed);
            }

            if !LedgerTxOps::mark_code_used(&mut tx, &record.id, owner_id).await? {
                tx.rollback().await?;
                return Err(Error::AlreadyRedeemed);
            }

            LedgerTxOps::ensure_account(&mut tx, owner_id).await?;
            let balance = LedgerTxOps::balance(&mut tx, owner_id).await?.unwrap_or(0);
            let entry = LedgerEntryDbModel::new(
                owner_id,
                LedgerEntryKind::Redeem,
                record.credit_amount,
                balance + record.credit_amount,
            )
            .with_description(format!(
                "redeem code {} for {} credits",
                record.code, record.credit_amount
            ));
            LedgerTxOps::apply_entry(&mut tx, &entry).await?;

            tx.commit().await?;
            Ok(record.credit_amount)
        })
        .await
    }
}
