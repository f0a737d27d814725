//! Subscription plan registry.
//!
//! Static reference data: each tier maps to a monthly credit allotment and a
//! concurrency limit. Plan changes apply to new submissions only; in-flight
//! reservations are never re-priced.

use serde::{Deserialize, Serialize};

/// Plan tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    /// Default tier for accounts without a paid subscription.
    Free,
    Basic,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Pro => "PRO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(Self::Free),
            "BASIC" => Some(Self::Basic),
            "PRO" => Some(Self::Pro),
            _ => None,
        }
    }
}

/// Billing periods for paid tiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MONTHLY" => Some(Self::Monthly),
            "YEARLY" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Length of one paid period in months.
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }
}

/// A subscription plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plan {
    pub tier: PlanTier,
    pub name: &'static str,
    /// Credits granted at the start of each monthly cycle.
    pub monthly_credits: i64,
    /// Maximum simultaneous tasks in PENDING or PROCESSING.
    pub concurrency_limit: u32,
    /// Reference price in USD cents per month when billed monthly.
    pub monthly_price_cents: u32,
    /// Reference average monthly price in USD cents when billed yearly.
    pub yearly_monthly_price_cents: u32,
}

const PLANS: [Plan; 3] = [
    Plan {
        tier: PlanTier::Free,
        name: "Free",
        monthly_credits: 0,
        concurrency_limit: 1,
        monthly_price_cents: 0,
        yearly_monthly_price_cents: 0,
    },
    Plan {
        tier: PlanTier::Basic,
        name: "Basic Plan",
        monthly_credits: 1000,
        concurrency_limit: 2,
        monthly_price_cents: 1200,
        yearly_monthly_price_cents: 900,
    },
    Plan {
        tier: PlanTier::Pro,
        name: "Pro Plan",
        monthly_credits: 2200,
        concurrency_limit: 5,
        monthly_price_cents: 2400,
        yearly_monthly_price_cents: 1900,
    },
];

/// Look up a tier's plan.
pub fn plan_for(tier: PlanTier) -> &'static Plan {
    match tier {
        PlanTier::Free => &PLANS[0],
        PlanTier::Basic => &PLANS[1],
        PlanTier::Pro => &PLANS[2],
    }
}

/// All plans, for the listing endpoint.
pub fn all_plans() -> &'static [Plan] {
    &PLANS
}

/// Resolve a stored tier string, falling back to FREE for unknown values.
pub fn plan_for_tier_str(tier: &str) -> &'static Plan {
    plan_for(PlanTier::parse(tier).unwrap_or(PlanTier::Free))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_lookup() {
        assert_eq!(plan_for(PlanTier::Basic).monthly_credits, 1000);
        assert_eq!(plan_for(PlanTier::Pro).monthly_credits, 2200);
        assert_eq!(plan_for(PlanTier::Free).concurrency_limit, 1);
    }

    #[test]
    fn test_unknown_tier_falls_back_to_free() {
        assert_eq!(plan_for_tier_str("ENTERPRISE").tier, PlanTier::Free);
    }

    #[test]
    fn test_period_months() {
        assert_eq!(BillingPeriod::Monthly.months(), 1);
        assert_eq!(BillingPeriod::Yearly.months(), 12);
    }
}
