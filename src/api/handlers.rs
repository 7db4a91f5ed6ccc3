//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use super::server::{AppState, RequestId};
use super::types::{QueryRequest, QueryResponse};
use crate::config::ModelConfig;
use crate::error::{Error, RequestError, REQUEST_ID_HEADER};
use crate::pipeline::QueryInput;
use crate::router::ModelTier;

/// Response header: correlation ID (UUID v4).
pub const TIERROUTE_REQUEST_ID_HEADER: &str = REQUEST_ID_HEADER;
/// Response header: wall-clock latency in milliseconds (integer).
pub const TIERROUTE_LATENCY_MS_HEADER: &str = "x-tierroute-latency-ms";
/// Response header: tier that generated the answer.
pub const TIERROUTE_TIER_HEADER: &str = "x-tierroute-tier";
/// Response header: total request cost in USD (6 decimals).
pub const TIERROUTE_COST_USD_HEADER: &str = "x-tierroute-cost-usd";

/// Attach routing metadata headers to a successful query response.
fn attach_router_headers(
    response: &mut Response,
    request_id: &str,
    latency_ms: u64,
    tier: ModelTier,
    cost_usd: f64,
) {
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(TIERROUTE_REQUEST_ID_HEADER), value);
    }
    headers.insert(
        HeaderName::from_static(TIERROUTE_LATENCY_MS_HEADER),
        HeaderValue::from(latency_ms),
    );
    headers.insert(
        HeaderName::from_static(TIERROUTE_TIER_HEADER),
        HeaderValue::from_static(tier.as_str()),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", cost_usd)) {
        headers.insert(HeaderName::from_static(TIERROUTE_COST_USD_HEADER), value);
    }
}

/// Handle POST /query
pub async fn query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, RequestError> {
    let correlation_id = request_id.0.to_string();

    let Json(request) = payload.map_err(|rejection| {
        tracing::info!(
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "Malformed query body"
        );
        RequestError::new(
            Error::BadRequest(rejection.body_text()),
            correlation_id.clone(),
        )
    })?;

    tracing::info!(
        correlation_id = %correlation_id,
        query_length = request.query.chars().count(),
        force_model = ?request.force_model,
        has_context = request.context.is_some(),
        "Query received"
    );

    let input: QueryInput = request.into();
    let outcome = state
        .pipeline
        .run(&correlation_id, &input)
        .await
        .map_err(|e| RequestError::new(e, correlation_id.clone()))?;

    let latency_ms = outcome.latency_ms;
    let tier = outcome.tier;
    let cost_usd = outcome.estimated_cost_usd;

    let mut response =
        Json(QueryResponse::from_outcome(outcome, correlation_id.clone())).into_response();
    attach_router_headers(&mut response, &correlation_id, latency_ms, tier, cost_usd);
    Ok(response)
}

/// Handle GET /costs
pub async fn cost_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.costs().summary())
}

/// Handle POST /costs/reset
pub async fn reset_costs(State(state): State<AppState>) -> impl IntoResponse {
    state.costs().reset();
    Json(serde_json::json!({ "status": "reset" }))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let models = &state.config.models;
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "models": {
            "small": models.small.name,
            "large": models.large.name,
            "router": models.router().name,
        }
    }))
}

fn tier_entry(tier: &str, model: &ModelConfig) -> serde_json::Value {
    serde_json::json!({
        "tier": tier,
        "model": model.name,
        "price_per_1k": model.price_per_1k,
    })
}

/// Handle GET /tiers
pub async fn list_tiers(State(state): State<AppState>) -> impl IntoResponse {
    let models = &state.config.models;
    Json(serde_json::json!({
        "tiers": [
            tier_entry(ModelTier::Small.as_str(), &models.small),
            tier_entry(ModelTier::Large.as_str(), &models.large),
        ],
        "router": tier_entry("router", models.router()),
        "fallback": state.config.routing.fallback.as_str(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    fn empty_response() -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_attach_headers() {
        let mut response = empty_response();
        attach_router_headers(
            &mut response,
            "550e8400-e29b-41d4-a716-446655440000",
            1523,
            ModelTier::Small,
            0.00051,
        );
        let headers = response.headers();
        assert_eq!(
            headers.get("x-tierroute-request-id").unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(headers.get("x-tierroute-latency-ms").unwrap(), "1523");
        assert_eq!(headers.get("x-tierroute-tier").unwrap(), "small");
        assert_eq!(headers.get("x-tierroute-cost-usd").unwrap(), "0.000510");
    }

    #[test]
    fn test_attach_headers_cost_formatting() {
        let mut response = empty_response();
        attach_router_headers(&mut response, "id", 0, ModelTier::Large, 1.5);
        assert_eq!(
            response.headers().get("x-tierroute-cost-usd").unwrap(),
            "1.500000"
        );

        let mut response = empty_response();
        attach_router_headers(&mut response, "id", 0, ModelTier::Large, 0.0);
        assert_eq!(
            response.headers().get("x-tierroute-cost-usd").unwrap(),
            "0.000000"
        );
        assert_eq!(response.headers().get("x-tierroute-tier").unwrap(), "large");
    }
}
