//! tierroute - complexity-based routing of LLM queries
//!
//! Each query is classified by a cheap router model and answered by either
//! a small or a large model tier, with guardrails on both sides and a
//! running cost ledger comparing spend against an all-large baseline.

pub mod api;
pub mod config;
pub mod cost;
pub mod error;
pub mod guard;
pub mod llm;
pub mod pipeline;
pub mod router;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
