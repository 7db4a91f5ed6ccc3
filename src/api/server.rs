//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::Config;
use crate::cost::{CostTracker, TierRates};
use crate::error::{Error, RequestError, REQUEST_ID_HEADER};
use crate::llm::ModelClient;
use crate::pipeline::Pipeline;

/// Per-request correlation ID, assigned before any handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn costs(&self) -> &CostTracker {
        self.pipeline.costs()
    }
}

/// Wire the pipeline and a fresh cost ledger from config.
pub fn build_state(config: Config, db: Option<SqlitePool>) -> Result<AppState, Error> {
    let client = ModelClient::from_config(&config.server)
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
    let costs = Arc::new(CostTracker::new(TierRates::from_models(&config.models)));
    let pipeline = Pipeline::new(&config, client, costs, db)?;

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
    })
}

/// Marks a response produced by the panic handler, holding the panic message.
#[derive(Debug, Clone)]
struct HandlerPanicked(String);

/// Turn a handler panic into a bare 500; `assign_request_id` renders the body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(HandlerPanicked(detail));
    response
}

/// Tag the request with a fresh ID and echo it on whatever response comes back.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Some(HandlerPanicked(detail)) = response.extensions_mut().remove::<HandlerPanicked>() {
        return RequestError::new(
            Error::Internal(format!("Handler panicked: {}", detail)),
            request_id.0.to_string(),
        )
        .into_response();
    }

    let headers = response.headers_mut();
    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
    }
    response
}

/// Wrap routes in tracing, CORS, request IDs and panic recovery.
fn with_middleware(routes: Router) -> Router {
    routes.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(middleware::from_fn(assign_request_id))
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    with_middleware(
        Router::new()
            .route("/query", post(handlers::query))
            .route("/costs", get(handlers::cost_summary))
            .route("/costs/reset", post(handlers::reset_costs))
            .route("/health", get(handlers::health))
            .route("/tiers", get(handlers::list_tiers))
            .with_state(state),
    )
}

async fn open_audit_log(config: &Config) -> Option<SqlitePool> {
    if !config.logging.log_costs {
        return None;
    }
    let db_config = config.database.as_ref()?;

    match crate::storage::init_pool(&db_config.path).await {
        Ok(pool) => {
            tracing::info!(path = %db_config.path, "Cost audit log enabled");
            Some(pool)
        }
        Err(e) => {
            tracing::warn!(
                path = %db_config.path,
                error = %e,
                "Failed to open cost audit log, continuing without it"
            );
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let db = open_audit_log(&config).await;
    let state = build_state(config, db)?;

    tracing::info!(
        small = %state.config.models.small.name,
        large = %state.config.models.large.name,
        router = %state.config.models.router().name,
        fallback = %state.config.routing.fallback,
        "Model tiers configured"
    );

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting tierroute server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
