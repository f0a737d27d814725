//! Subscription and payment database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscription database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionDbModel {
    pub id: String,
    pub owner_id: String,
    /// Tier: BASIC, PRO
    pub tier: String,
    /// Billing period: MONTHLY, YEARLY
    pub period: String,
    /// Status: PENDING, ACTIVE, CANCELLED, EXPIRED, DELETED
    pub status: String,
    pub monthly_credits: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub cancelled_at: Option<String>,
}

impl SubscriptionDbModel {
    pub fn new(
        owner_id: impl Into<String>,
        tier: impl Into<String>,
        period: impl Into<String>,
        monthly_credits: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            tier: tier.into(),
            period: period.into(),
            status: SubscriptionStatus::Pending.as_str().to_string(),
            monthly_credits,
            start_date: None,
            end_date: None,
            created_at: now.clone(),
            updated_at: now,
            cancelled_at: None,
        }
    }
}

/// Subscription status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    /// Created, awaiting payment confirmation.
    Pending,
    /// Paid and current.
    Active,
    /// Cancelled; remains usable until the end date.
    Cancelled,
    /// Past its end date.
    Expired,
    /// Abandoned before payment.
    Deleted,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_new_is_pending() {
        let sub = SubscriptionDbModel::new("owner-1", "BASIC", "MONTHLY", 1000);
        assert_eq!(sub.status, "PENDING");
        assert!(sub.start_date.is_none());
    }
}
