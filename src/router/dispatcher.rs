//! Tier selection and the generation call.

use serde::Serialize;

use super::{Classification, Complexity, ModelTier};
use crate::config::{Config, ModelConfig};
use crate::llm::{LlmError, ModelClient, TokenUsage};

/// Why a tier was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionBasis {
    /// An explicit `force_model` override.
    Override,
    /// Derived from the complexity label.
    Classified,
    /// A non-COMPLEX label escalated because confidence was below `min_confidence`.
    LowConfidence,
}

/// Outcome of tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChoice {
    pub tier: ModelTier,
    pub basis: SelectionBasis,
}

impl TierChoice {
    pub fn forced(tier: ModelTier) -> Self {
        Self {
            tier,
            basis: SelectionBasis::Override,
        }
    }
}

/// Map a classification and optional override to a tier.
///
/// An override always wins. Otherwise COMPLEX routes to the large tier and
/// SIMPLE/MODERATE to the small tier, unless `min_confidence` is set and the
/// classification's confidence falls below it.
pub fn select_tier(
    classification: &Classification,
    override_tier: Option<ModelTier>,
    min_confidence: Option<f64>,
) -> TierChoice {
    if let Some(tier) = override_tier {
        return TierChoice::forced(tier);
    }

    match classification.complexity {
        Complexity::Complex => TierChoice {
            tier: ModelTier::Large,
            basis: SelectionBasis::Classified,
        },
        Complexity::Simple | Complexity::Moderate => match min_confidence {
            Some(min) if classification.confidence < min => TierChoice {
                tier: ModelTier::Large,
                basis: SelectionBasis::LowConfidence,
            },
            _ => TierChoice {
                tier: ModelTier::Small,
                basis: SelectionBasis::Classified,
            },
        },
    }
}

/// Result of the generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Raw answer text, before the output guard
    pub answer: String,
    pub tier: ModelTier,
    pub usage: TokenUsage,
}

/// Build the prompt sent to the generation model.
fn generation_prompt(query: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("Context:\n{}\n\nQuestion:\n{}", context, query),
        None => query.to_string(),
    }
}

/// Sends queries to the selected generation tier.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: ModelClient,
    small: ModelConfig,
    large: ModelConfig,
    system_prompt: String,
    min_confidence: Option<f64>,
}

impl Dispatcher {
    pub fn new(client: ModelClient, config: &Config) -> Self {
        Self {
            client,
            small: config.models.small.clone(),
            large: config.models.large.clone(),
            system_prompt: config.guardrails.system_prompt.clone(),
            min_confidence: config.routing.min_confidence,
        }
    }

    /// Model configuration backing a tier.
    pub fn model(&self, tier: ModelTier) -> &ModelConfig {
        match tier {
            ModelTier::Small => &self.small,
            ModelTier::Large => &self.large,
        }
    }

    /// Select a tier using the configured confidence threshold.
    pub fn choose(
        &self,
        classification: &Classification,
        override_tier: Option<ModelTier>,
    ) -> TierChoice {
        select_tier(classification, override_tier, self.min_confidence)
    }

    /// Issue the generation call on `tier`. No retry, no tier fallback.
    pub async fn generate(
        &self,
        tier: ModelTier,
        query: &str,
        context: Option<&str>,
    ) -> Result<Generation, LlmError> {
        let model = self.model(tier);
        let prompt = generation_prompt(query, context);

        let completion = self
            .client
            .complete(model, Some(&self.system_prompt), &prompt)
            .await?;

        Ok(Generation {
            answer: completion.content,
            tier,
            usage: completion.usage,
        })
    }

    /// Select a tier and generate in one step.
    pub async fn dispatch(
        &self,
        query: &str,
        context: Option<&str>,
        classification: &Classification,
        override_tier: Option<ModelTier>,
    ) -> Result<Generation, LlmError> {
        let choice = self.choose(classification, override_tier);
        self.generate(choice.tier, query, context).await
    }
}
