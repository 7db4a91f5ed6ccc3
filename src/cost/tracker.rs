//! In-memory cost ledger.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ModelsConfig;
use crate::llm::TokenUsage;
use crate::router::{Complexity, ModelTier};

/// Per-tier model identifiers and prices.
#[derive(Debug, Clone)]
pub struct TierRates {
    pub small_model: String,
    pub small_price_per_1k: f64,
    pub large_model: String,
    pub large_price_per_1k: f64,
    pub router_price_per_1k: f64,
}

impl TierRates {
    pub fn from_models(models: &ModelsConfig) -> Self {
        Self {
            small_model: models.small.name.clone(),
            small_price_per_1k: models.small.price_per_1k,
            large_model: models.large.name.clone(),
            large_price_per_1k: models.large.price_per_1k,
            router_price_per_1k: models.router().price_per_1k,
        }
    }

    pub fn price(&self, tier: ModelTier) -> f64 {
        match tier {
            ModelTier::Small => self.small_price_per_1k,
            ModelTier::Large => self.large_price_per_1k,
        }
    }

    pub fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small_model,
            ModelTier::Large => &self.large_model,
        }
    }
}

/// Cost in USD of `tokens` at `price_per_1k`.
pub fn token_cost(tokens: u64, price_per_1k: f64) -> f64 {
    tokens as f64 / 1000.0 * price_per_1k
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// What a completed request consumed.
#[derive(Debug, Clone, Copy)]
pub struct Charge {
    pub tier: ModelTier,
    pub usage: TokenUsage,
    /// `None` when the tier was forced and no classification ran
    pub complexity: Option<Complexity>,
    pub routing_usage: TokenUsage,
}

impl Charge {
    pub fn new(tier: ModelTier, usage: TokenUsage) -> Self {
        Self {
            tier,
            usage,
            complexity: None,
            routing_usage: TokenUsage::default(),
        }
    }

    pub fn with_routing(mut self, complexity: Complexity, routing_usage: TokenUsage) -> Self {
        self.complexity = Some(complexity);
        self.routing_usage = routing_usage;
        self
    }
}

/// One completed request. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    pub correlation_id: String,
    pub tier: ModelTier,
    pub model: String,
    pub complexity: Option<Complexity>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Generation cost at the tier's price
    pub cost_usd: f64,
    pub routing_tokens: u64,
    /// Classification overhead at the router model's price
    pub routing_cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostRecord {
    pub fn generation_tokens(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.cost_usd + self.routing_cost_usd
    }
}

/// Aggregates derived from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_requests: usize,
    /// Generation plus routing tokens
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub routed_to_small: usize,
    pub routed_to_large: usize,
    /// What the same generation tokens would have cost on the large tier
    pub baseline_cost_usd: f64,
    /// Percentage saved versus the baseline, one decimal, never negative
    pub cost_savings_pct: f64,
}

/// Append-only ledger of cost records with a single lock per operation.
#[derive(Debug)]
pub struct CostTracker {
    rates: TierRates,
    ledger: Mutex<Vec<CostRecord>>,
}

impl CostTracker {
    pub fn new(rates: TierRates) -> Self {
        Self {
            rates,
            ledger: Mutex::new(Vec::new()),
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Vec<CostRecord>> {
        // A panic while holding the lock cannot leave a half-written record.
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Price a charge and append it to the ledger.
    pub fn record(&self, correlation_id: &str, charge: Charge) -> CostRecord {
        let record = CostRecord {
            correlation_id: correlation_id.to_string(),
            tier: charge.tier,
            model: self.rates.model(charge.tier).to_string(),
            complexity: charge.complexity,
            input_tokens: charge.usage.input_tokens,
            output_tokens: charge.usage.output_tokens,
            cost_usd: token_cost(charge.usage.total(), self.rates.price(charge.tier)),
            routing_tokens: charge.routing_usage.total(),
            routing_cost_usd: token_cost(
                charge.routing_usage.total(),
                self.rates.router_price_per_1k,
            ),
            timestamp: Utc::now(),
        };

        self.ledger().push(record.clone());
        record
    }

    /// Aggregate the ledger.
    pub fn summary(&self) -> CostSummary {
        let ledger = self.ledger();

        let mut summary = CostSummary {
            total_requests: ledger.len(),
            total_tokens: 0,
            total_cost_usd: 0.0,
            routed_to_small: 0,
            routed_to_large: 0,
            baseline_cost_usd: 0.0,
            cost_savings_pct: 0.0,
        };

        for record in ledger.iter() {
            summary.total_tokens += record.generation_tokens() + record.routing_tokens;
            summary.total_cost_usd += record.total_cost_usd();
            summary.baseline_cost_usd +=
                token_cost(record.generation_tokens(), self.rates.large_price_per_1k);
            match record.tier {
                ModelTier::Small => summary.routed_to_small += 1,
                ModelTier::Large => summary.routed_to_large += 1,
            }
        }
        drop(ledger);

        if summary.baseline_cost_usd > 0.0 {
            let saved = 1.0 - summary.total_cost_usd / summary.baseline_cost_usd;
            summary.cost_savings_pct = round_to(saved * 100.0, 1).max(0.0);
        }
        summary.total_cost_usd = round_to(summary.total_cost_usd, 6);
        summary.baseline_cost_usd = round_to(summary.baseline_cost_usd, 6);

        summary
    }

    /// Clear the whole ledger.
    pub fn reset(&self) {
        let mut ledger = self.ledger();
        let cleared = ledger.len();
        ledger.clear();
        tracing::info!(cleared, "Cost ledger reset");
    }

    /// Snapshot of the ledger in insertion order.
    pub fn records(&self) -> Vec<CostRecord> {
        self.ledger().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn rates() -> TierRates {
        TierRates {
            small_model: "flash".to_string(),
            small_price_per_1k: 0.000375,
            large_model: "pro".to_string(),
            large_price_per_1k: 0.00625,
            router_price_per_1k: 0.000375,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_record_prices_tokens_at_tier_rate() {
        let tracker = CostTracker::new(rates());
        let record = tracker.record("req-1", Charge::new(ModelTier::Large, TokenUsage::new(600, 400)));

        assert_eq!(record.tier, ModelTier::Large);
        assert_eq!(record.model, "pro");
        assert!(approx(record.cost_usd, 0.00625));
        assert_eq!(record.routing_tokens, 0);
        assert_eq!(record.routing_cost_usd, 0.0);
        assert!(record.complexity.is_none());
    }

    #[test]
    fn test_record_includes_routing_overhead() {
        let tracker = CostTracker::new(rates());
        let charge = Charge::new(ModelTier::Small, TokenUsage::new(1000, 1000))
            .with_routing(Complexity::Simple, TokenUsage::new(150, 50));
        let record = tracker.record("req-1", charge);

        assert!(approx(record.cost_usd, 0.00075));
        assert_eq!(record.routing_tokens, 200);
        assert!(approx(record.routing_cost_usd, 0.000075));
        assert_eq!(record.complexity, Some(Complexity::Simple));
    }

    #[test]
    fn test_empty_summary() {
        let summary = CostTracker::new(rates()).summary();
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.total_tokens, 0);
        assert_eq!(summary.total_cost_usd, 0.0);
        assert_eq!(summary.cost_savings_pct, 0.0);
    }

    #[test]
    fn test_summary_counts_tiers_and_tokens() {
        let tracker = CostTracker::new(rates());
        tracker.record("a", Charge::new(ModelTier::Small, TokenUsage::new(100, 100)));
        tracker.record("b", Charge::new(ModelTier::Small, TokenUsage::new(50, 50)));
        tracker.record(
            "c",
            Charge::new(ModelTier::Large, TokenUsage::new(200, 300))
                .with_routing(Complexity::Complex, TokenUsage::new(10, 2)),
        );

        let summary = tracker.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.routed_to_small, 2);
        assert_eq!(summary.routed_to_large, 1);
        assert_eq!(summary.total_tokens, 200 + 100 + 500 + 12);
    }

    #[test]
    fn test_all_large_has_zero_savings() {
        let tracker = CostTracker::new(rates());
        for i in 0..5 {
            tracker.record(
                &format!("req-{}", i),
                Charge::new(ModelTier::Large, TokenUsage::new(1000, 500)),
            );
        }
        assert_eq!(tracker.summary().cost_savings_pct, 0.0);
    }

    #[test]
    fn test_all_large_with_routing_overhead_clamps_to_zero() {
        let tracker = CostTracker::new(rates());
        tracker.record(
            "req",
            Charge::new(ModelTier::Large, TokenUsage::new(1000, 500))
                .with_routing(Complexity::Complex, TokenUsage::new(100, 5)),
        );
        assert_eq!(tracker.summary().cost_savings_pct, 0.0);
    }

    #[test]
    fn test_all_small_approaches_price_ratio() {
        let tracker = CostTracker::new(rates());
        for i in 0..10 {
            tracker.record(
                &format!("req-{}", i),
                Charge::new(ModelTier::Small, TokenUsage::new(800, 200)),
            );
        }
        // 1 - 0.000375 / 0.00625 = 94%
        assert_eq!(tracker.summary().cost_savings_pct, 94.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let tracker = CostTracker::new(rates());
        for i in 0..4 {
            tracker.record(
                &format!("req-{}", i),
                Charge::new(ModelTier::Small, TokenUsage::new(10, 10)),
            );
        }
        tracker.reset();

        let summary = tracker.summary();
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.total_tokens, 0);
        assert!(tracker.records().is_empty());
    }

    #[test]
    fn test_concurrent_records_are_counted_once() {
        let tracker = Arc::new(CostTracker::new(rates()));
        let threads = 8;
        let per_thread = 250;

        std::thread::scope(|scope| {
            for t in 0..threads {
                let tracker = tracker.clone();
                scope.spawn(move || {
                    for i in 0..per_thread {
                        let tier = if i % 2 == 0 {
                            ModelTier::Small
                        } else {
                            ModelTier::Large
                        };
                        tracker.record(
                            &format!("t{}-{}", t, i),
                            Charge::new(tier, TokenUsage::new(1, 1)),
                        );
                    }
                });
            }
        });

        let summary = tracker.summary();
        assert_eq!(summary.total_requests, threads * per_thread);
        assert_eq!(summary.total_tokens, (threads * per_thread * 2) as u64);
        assert_eq!(summary.routed_to_small + summary.routed_to_large, threads * per_thread);
        assert_eq!(summary.routed_to_small, threads * per_thread / 2);
    }

    #[test]
    fn test_ledger_preserves_insertion_order() {
        let tracker = CostTracker::new(rates());
        tracker.record("first", Charge::new(ModelTier::Small, TokenUsage::new(1, 1)));
        tracker.record("second", Charge::new(ModelTier::Large, TokenUsage::new(1, 1)));
        let ids: Vec<_> = tracker
            .records()
            .into_iter()
            .map(|r| r.correlation_id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
