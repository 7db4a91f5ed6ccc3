//! Cost accounting.

mod comparison;
mod tracker;

pub use comparison::{compare, CostComparison};
pub(crate) use tracker::round_to;
pub use tracker::{token_cost, Charge, CostRecord, CostSummary, CostTracker, TierRates};
