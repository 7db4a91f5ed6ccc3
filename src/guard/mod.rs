//! Guardrails applied before and after the model calls.

mod input;
mod output;

pub use input::{InputGuard, Rejection};
pub use output::{OutputGuard, EMPTY_ANSWER_NOTICE, TRUNCATION_NOTICE};
