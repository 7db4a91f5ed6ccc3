//! Complexity classification with a cheap router model.

use serde::Serialize;

use super::Complexity;
use crate::config::{ModelConfig, RoutingConfig};
use crate::llm::{LlmError, ModelClient, TokenUsage};

const ROUTER_SYSTEM_PROMPT: &str = "\
You are a query complexity classifier. Read the user's query and decide how much \
reasoning a model needs to answer it well.

SIMPLE: factual lookups, definitions, short answers.
MODERATE: summaries, explanations, comparisons of a few items.
COMPLEX: multi-step reasoning, system design, analysis with trade-offs, code architecture.

Answer with the label alone on the first line, then a line of the form \
`confidence: <number between 0 and 1>`.";

const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    ("What is Python?", "SIMPLE\nconfidence: 0.95"),
    (
        "Summarize the key benefits of microservices",
        "MODERATE\nconfidence: 0.8",
    ),
    (
        "Design a distributed caching system that handles 1M QPS across 5 regions",
        "COMPLEX\nconfidence: 0.9",
    ),
];

/// Build the user prompt sent to the router model.
pub(crate) fn build_prompt(query: &str) -> String {
    let examples = FEW_SHOT_EXAMPLES
        .iter()
        .map(|(q, r)| format!("Query: {}\nResponse: {}", q, r))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Examples:\n{}\n\nNow classify this query:\n{}",
        examples, query
    )
}

/// Where a classification came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Parsed from the router model's answer.
    Parsed,
    /// The fallback policy was applied.
    Fallback { reason: String },
}

/// Result of the classification step.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub complexity: Complexity,
    /// Always within [0, 1]
    pub confidence: f64,
    pub reason: Option<String>,
    pub source: ClassificationSource,
    /// Tokens spent on the router call (zero when the call failed)
    pub usage: TokenUsage,
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ClassificationSource::Fallback { .. })
    }
}

/// Failure of the router call itself.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Router model '{model}' call failed: {source}")]
    Call {
        model: String,
        #[source]
        source: LlmError,
    },
}

fn clamp_confidence(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        default
    }
}

/// Try to read a JSON object from the router output, tolerating markdown fences.
fn parse_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let text = text.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(text) {
        return Some(map);
    }
    if text.contains("```") {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end > start {
            if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&text[start..=end]) {
                return Some(map);
            }
        }
    }
    None
}

fn json_confidence(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Pull a `confidence: 0.8` (or `confidence = 0.8`) value from any line.
fn text_confidence(text: &str) -> Option<f64> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();
        let rest = lower.strip_prefix("confidence")?;
        let value = rest.trim_start().strip_prefix([':', '='])?;
        value.trim().trim_end_matches('.').parse().ok()
    })
}

/// Parse the router model's answer.
///
/// Accepts a JSON object with `complexity`, `confidence` and `reason`, or
/// plain text whose first non-empty line starts with the label. Returns
/// `None` when no label can be found. A missing or malformed confidence
/// becomes `default_confidence`; any confidence is clamped to [0, 1].
pub fn parse_classification(
    text: &str,
    default_confidence: f64,
) -> Option<(Complexity, f64, Option<String>)> {
    if let Some(map) = parse_json_object(text) {
        let complexity = map
            .get("complexity")
            .and_then(|v| v.as_str())
            .and_then(Complexity::parse)?;
        let confidence = map
            .get("confidence")
            .and_then(json_confidence)
            .map(|c| clamp_confidence(c, default_confidence))
            .unwrap_or(default_confidence);
        let reason = map
            .get("reason")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        return Some((complexity, confidence, reason));
    }

    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let label = first_line
        .split_once(':')
        .filter(|(key, _)| {
            let key = key.trim().to_ascii_lowercase();
            key == "label" || key == "complexity" || key == "classification"
        })
        .map(|(_, value)| value)
        .unwrap_or(first_line);
    let complexity = label.split_whitespace().next().and_then(Complexity::parse)?;
    let confidence = text_confidence(text)
        .map(|c| clamp_confidence(c, default_confidence))
        .unwrap_or(default_confidence);

    Some((complexity, confidence, None))
}

/// Classifies queries by asking the router model once.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    client: ModelClient,
    model: ModelConfig,
    fallback: Complexity,
    default_confidence: f64,
}

impl QueryRouter {
    pub fn new(client: ModelClient, model: ModelConfig, routing: &RoutingConfig) -> Self {
        Self {
            client,
            model,
            fallback: routing.fallback,
            default_confidence: routing.default_confidence,
        }
    }

    /// Classification used whenever the router cannot produce one.
    pub fn fallback(&self, reason: impl Into<String>, usage: TokenUsage) -> Classification {
        Classification {
            complexity: self.fallback,
            confidence: self.default_confidence,
            reason: None,
            source: ClassificationSource::Fallback {
                reason: reason.into(),
            },
            usage,
        }
    }

    /// Classify a query with one router call.
    ///
    /// An unparseable answer yields the fallback classification; only a
    /// failed call is an error.
    pub async fn classify(&self, query: &str) -> Result<Classification, ClassificationError> {
        let completion = self
            .client
            .complete(&self.model, Some(ROUTER_SYSTEM_PROMPT), &build_prompt(query))
            .await
            .map_err(|source| ClassificationError::Call {
                model: self.model.name.clone(),
                source,
            })?;

        match parse_classification(&completion.content, self.default_confidence) {
            Some((complexity, confidence, reason)) => Ok(Classification {
                complexity,
                confidence,
                reason,
                source: ClassificationSource::Parsed,
                usage: completion.usage,
            }),
            None => {
                let preview: String = completion.content.chars().take(100).collect();
                tracing::warn!(
                    response = %preview,
                    fallback = %self.fallback,
                    "Unparseable router response, applying fallback"
                );
                Ok(self.fallback("unparseable router response", completion.usage))
            }
        }
    }

    /// Classify, degrading to the fallback classification when the call fails.
    pub async fn classify_or_fallback(&self, query: &str) -> Classification {
        match self.classify(query).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.fallback,
                    "Classification failed, applying fallback"
                );
                self.fallback(e.to_string(), TokenUsage::default())
            }
        }
    }
}
