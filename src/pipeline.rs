//! The per-request query pipeline.
//!
//! validate -> classify -> dispatch -> sanitize -> record, strictly in order.
//! Only the two model calls suspend.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::config::{Config, ConfigError};
use crate::cost::{round_to, Charge, CostRecord, CostTracker};
use crate::error::Error;
use crate::guard::{InputGuard, OutputGuard};
use crate::llm::ModelClient;
use crate::router::{
    Classification, ClassificationSource, Dispatcher, ModelTier, QueryRouter, SelectionBasis,
    TierChoice,
};
use crate::storage::spawn_cost_write;

/// Complexity reported when the tier was forced and no classification ran.
pub const FORCED_COMPLEXITY: &str = "FORCED";

/// One query as received from a client.
#[derive(Debug, Clone, Default)]
pub struct QueryInput {
    pub query: String,
    pub context: Option<String>,
    /// Raw override value; anything other than "small"/"large" is ignored
    pub force_model: Option<String>,
}

/// Everything a completed request reports back.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub model_used: String,
    pub tier: ModelTier,
    pub complexity: String,
    pub confidence: f64,
    /// Generation plus routing tokens
    pub tokens_used: u64,
    pub estimated_cost_usd: f64,
    pub basis: SelectionBasis,
    pub classification_fallback: bool,
    pub latency_ms: u64,
}

/// Owns every per-request component plus a handle to the shared ledger.
pub struct Pipeline {
    input_guard: InputGuard,
    router: QueryRouter,
    dispatcher: Dispatcher,
    output_guard: OutputGuard,
    costs: Arc<CostTracker>,
    db: Option<SqlitePool>,
}

impl Pipeline {
    /// Build the pipeline. `db` receives cost records when present.
    pub fn new(
        config: &Config,
        client: ModelClient,
        costs: Arc<CostTracker>,
        db: Option<SqlitePool>,
    ) -> Result<Self, Error> {
        let invalid_pattern =
            |e: regex::Error| ConfigError::Validation(format!("Invalid blocked pattern: {}", e));

        Ok(Self {
            input_guard: InputGuard::new(&config.guardrails).map_err(invalid_pattern)?,
            output_guard: OutputGuard::new(&config.guardrails).map_err(invalid_pattern)?,
            router: QueryRouter::new(
                client.clone(),
                config.models.router().clone(),
                &config.routing,
            ),
            dispatcher: Dispatcher::new(client, config),
            costs,
            db,
        })
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    /// Run one query end to end.
    ///
    /// Either returns a full outcome with exactly one ledger record, or fails
    /// without recording anything. Every event emitted along the way, including
    /// those from the guards and the router, is inside a `query` span carrying
    /// `correlation_id`.
    pub async fn run(&self, correlation_id: &str, input: &QueryInput) -> Result<QueryOutcome, Error> {
        let span = tracing::info_span!("query", correlation_id = %correlation_id);
        self.execute(correlation_id, input).instrument(span).await
    }

    async fn execute(&self, correlation_id: &str, input: &QueryInput) -> Result<QueryOutcome, Error> {
        let start = Instant::now();

        let query = match self.input_guard.validate(&input.query) {
            Ok(query) => query,
            Err(rejection) => {
                tracing::info!(rejection = %rejection, "Input rejected");
                return Err(rejection.into());
            }
        };

        let override_tier = parse_override(input.force_model.as_deref());

        let (choice, classification) = match override_tier {
            Some(tier) => (TierChoice::forced(tier), None),
            None => {
                let classification = self.router.classify_or_fallback(query).await;
                let choice = self.dispatcher.choose(&classification, None);
                (choice, Some(classification))
            }
        };

        log_routing_decision(&choice, classification.as_ref());

        let generation = self
            .dispatcher
            .generate(choice.tier, query, input.context.as_deref())
            .await
            .map_err(|source| {
                let model = self.dispatcher.model(choice.tier).name.clone();
                tracing::error!(
                    tier = %choice.tier,
                    model = %model,
                    error = %source,
                    "Generation failed"
                );
                Error::Generation {
                    tier: choice.tier,
                    model,
                    source,
                }
            })?;

        let answer = self.output_guard.sanitize(&generation.answer);

        let charge = match &classification {
            Some(c) => Charge::new(choice.tier, generation.usage).with_routing(c.complexity, c.usage),
            None => Charge::new(choice.tier, generation.usage),
        };
        let record = self.costs.record(correlation_id, charge);
        self.persist(&record);

        let latency_ms = start.elapsed().as_millis() as u64;
        let outcome = build_outcome(answer, &record, classification.as_ref(), choice, latency_ms);

        tracing::info!(
            tier = %outcome.tier,
            model = %outcome.model_used,
            tokens = outcome.tokens_used,
            cost_usd = outcome.estimated_cost_usd,
            latency_ms,
            "Query completed"
        );

        Ok(outcome)
    }

    fn persist(&self, record: &CostRecord) {
        if let Some(pool) = &self.db {
            spawn_cost_write(pool, record.clone());
        }
    }
}

fn parse_override(force_model: Option<&str>) -> Option<ModelTier> {
    let raw = force_model?;
    let tier = ModelTier::parse(raw);
    if tier.is_none() {
        tracing::warn!(force_model = %raw, "Ignoring unrecognized force_model value");
    }
    tier
}

fn log_routing_decision(choice: &TierChoice, classification: Option<&Classification>) {
    match classification {
        Some(c) => {
            let source = match &c.source {
                ClassificationSource::Parsed => "parsed",
                ClassificationSource::Fallback { .. } => "fallback",
            };
            tracing::info!(
                complexity = %c.complexity,
                confidence = c.confidence,
                tier = %choice.tier,
                basis = ?choice.basis,
                source,
                "Routing decision"
            );
        }
        None => tracing::info!(tier = %choice.tier, "Routing decision forced by override"),
    }
}

fn build_outcome(
    answer: String,
    record: &CostRecord,
    classification: Option<&Classification>,
    choice: TierChoice,
    latency_ms: u64,
) -> QueryOutcome {
    let (complexity, confidence, classification_fallback) = match classification {
        Some(c) => (c.complexity.as_str().to_string(), c.confidence, c.is_fallback()),
        None => (FORCED_COMPLEXITY.to_string(), 1.0, false),
    };

    QueryOutcome {
        answer,
        model_used: record.model.clone(),
        tier: record.tier,
        complexity,
        confidence,
        tokens_used: record.generation_tokens() + record.routing_tokens,
        estimated_cost_usd: round_to(record.total_cost_usd(), 6),
        basis: choice.basis,
        classification_fallback,
        latency_ms,
    }
}
