//! Hosted model collaborator.
//!
//! Both the classification call and the generation call go through
//! [`ModelClient`], which speaks the OpenAI chat-completions protocol.

mod client;
pub mod types;

pub use client::{Completion, LlmError, ModelClient};
pub use types::{estimate_tokens, TokenUsage};
