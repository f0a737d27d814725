//! Credit ledger database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single append-only credit ledger entry.
///
/// `balance_after` snapshots the owner's balance after this entry applied;
/// replaying an owner's entries in creation order reproduces the stored
/// balance exactly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntryDbModel {
    pub id: String,
    pub owner_id: String,
    /// Kind: MONTHLY_GRANT, MONTHLY_RECLAIM, TASK_CONSUME, REFUND,
    /// ADMIN_ADJUST, PURCHASE, REDEEM
    pub kind: String,
    /// Signed amount: positive for gain, negative for consumption
    pub amount: i64,
    /// Balance after applying this entry
    pub balance_after: i64,
    /// Task reference for TASK_CONSUME / REFUND entries
    pub task_id: Option<String>,
    pub description: Option<String>,
    /// ISO 8601 timestamp
    pub created_at: String,
}

impl LedgerEntryDbModel {
    pub fn new(
        owner_id: impl Into<String>,
        kind: LedgerEntryKind,
        amount: i64,
        balance_after: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            kind: kind.as_str().to_string(),
            amount,
            balance_after,
            task_id: None,
            description: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ledger entry kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryKind {
    /// Monthly subscription allotment.
    MonthlyGrant,
    /// Claw-back of the unused part of the previous monthly grant.
    MonthlyReclaim,
    /// Consumption of a completed task's reservation.
    TaskConsume,
    /// Operator-issued refund.
    Refund,
    /// Manual balance adjustment by an operator.
    AdminAdjust,
    /// One-time credit purchase.
    Purchase,
    /// Redeem code redemption.
    Redeem,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthlyGrant => "MONTHLY_GRANT",
            Self::MonthlyReclaim => "MONTHLY_RECLAIM",
            Self::TaskConsume => "TASK_CONSUME",
            Self::Refund => "REFUND",
            Self::AdminAdjust => "ADMIN_ADJUST",
            Self::Purchase => "PURCHASE",
            Self::Redeem => "REDEEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MONTHLY_GRANT" => Some(Self::MonthlyGrant),
            "MONTHLY_RECLAIM" => Some(Self::MonthlyReclaim),
            "TASK_CONSUME" => Some(Self::TaskConsume),
            "REFUND" => Some(Self::Refund),
            "ADMIN_ADJUST" => Some(Self::AdminAdjust),
            "PURCHASE" => Some(Self::Purchase),
            "REDEEM" => Some(Self::Redeem),
            _ => None,
        }
    }
}

/// Redeem code database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RedeemCodeDbModel {
    pub id: String,
    pub code: String,
    pub credit_amount: i64,
    pub is_used: i64,
    pub used_by: Option<String>,
    pub used_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RedeemCodeDbModel {
    pub fn new(code: impl Into<String>, credit_amount: i64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.into(),
            credit_amount,
            is_used: 0,
            used_by: None,
            used_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
