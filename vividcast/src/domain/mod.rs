//! Domain types: plan registry, pricing, input validation data.

pub mod language;
pub mod plan;
pub mod pricing;

pub use plan::{BillingPeriod, Plan, PlanTier};
pub use pricing::{CostModel, SegmentEstimateCostModel};
