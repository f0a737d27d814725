//! Account database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-owner account row.
///
/// `credit_balance` is the durable balance and always equals the
/// `balance_after` of the owner's latest ledger entry. Reservations are not
/// reflected here; they live in the ledger's in-memory hold table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountDbModel {
    pub owner_id: String,
    pub credit_balance: i64,
    /// Plan tier: FREE, BASIC, PRO
    pub plan_tier: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AccountDbModel {
    pub fn new(owner_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            owner_id: owner_id.into(),
            credit_balance: 0,
            plan_tier: "FREE".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
