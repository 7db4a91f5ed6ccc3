//! What-if comparison between tiered routing and always using the large tier.

use serde::Serialize;

use super::tracker::{round_to, token_cost};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostComparison {
    pub routed_cost_usd: f64,
    pub naive_cost_usd: f64,
    pub savings_usd: f64,
    pub savings_pct: f64,
}

/// Compare the cost of a small/large token split against sending every
/// token to the large tier.
pub fn compare(
    small_tokens: u64,
    large_tokens: u64,
    small_price_per_1k: f64,
    large_price_per_1k: f64,
) -> CostComparison {
    let routed = token_cost(small_tokens, small_price_per_1k)
        + token_cost(large_tokens, large_price_per_1k);
    let naive = token_cost(small_tokens + large_tokens, large_price_per_1k);
    let savings_pct = if naive > 0.0 {
        (naive - routed) / naive * 100.0
    } else {
        0.0
    };

    CostComparison {
        routed_cost_usd: round_to(routed, 6),
        naive_cost_usd: round_to(naive, 6),
        savings_usd: round_to(naive - routed, 6),
        savings_pct: round_to(savings_pct, 1),
    }
}
