//! HTTP API module.
//!
//! Exposes the query pipeline and the cost ledger over axum.

mod handlers;
mod server;
pub mod types;

pub use handlers::{
    TIERROUTE_COST_USD_HEADER, TIERROUTE_LATENCY_MS_HEADER, TIERROUTE_REQUEST_ID_HEADER,
    TIERROUTE_TIER_HEADER,
};
pub use server::{build_state, create_router, run_server, AppState, RequestId};
pub use types::{QueryRequest, QueryResponse};
