//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::pipeline::{QueryInput, QueryOutcome};

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// "small" or "large"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_model: Option<String>,
}

impl From<QueryRequest> for QueryInput {
    fn from(request: QueryRequest) -> Self {
        QueryInput {
            query: request.query,
            context: request.context,
            force_model: request.force_model,
        }
    }
}

/// Body returned by a successful `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub model_used: String,
    pub complexity: String,
    pub confidence: f64,
    pub tokens_used: u64,
    pub estimated_cost_usd: f64,
    pub correlation_id: String,
}

impl QueryResponse {
    pub fn from_outcome(outcome: QueryOutcome, correlation_id: String) -> Self {
        Self {
            answer: outcome.answer,
            model_used: outcome.model_used,
            complexity: outcome.complexity,
            confidence: outcome.confidence,
            tokens_used: outcome.tokens_used,
            estimated_cost_usd: outcome.estimated_cost_usd,
            correlation_id,
        }
    }
}
