//! Input guard: rejects queries before any model call.

use regex::Regex;
use serde::Serialize;

use crate::config::GuardrailsConfig;

/// Why a query was rejected. Checks run in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("Query cannot be empty")]
    Empty,

    #[error("Query exceeds maximum length of {max} characters")]
    TooLong { max: usize, length: usize },

    #[error("Query contains disallowed patterns")]
    Blocked,
}

/// Validates incoming queries against configured limits and blocklists.
#[derive(Debug, Clone)]
pub struct InputGuard {
    max_length: usize,
    blocked_terms: Vec<String>,
    blocked_patterns: Vec<Regex>,
}

impl InputGuard {
    /// Build a guard from config. Fails if a blocked pattern is not a valid regex.
    pub fn new(config: &GuardrailsConfig) -> Result<Self, regex::Error> {
        let blocked_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_length: config.max_input_length,
            blocked_terms: config
                .blocked_terms
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            blocked_patterns,
        })
    }

    /// Validate a query, returning it trimmed.
    ///
    /// The first failing check determines the rejection.
    pub fn validate<'a>(&self, query: &'a str) -> Result<&'a str, Rejection> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(Rejection::Empty);
        }

        let length = query.chars().count();
        if length > self.max_length {
            return Err(Rejection::TooLong {
                max: self.max_length,
                length,
            });
        }

        let lower = query.to_lowercase();
        if let Some(term) = self.blocked_terms.iter().find(|t| lower.contains(t.as_str())) {
            tracing::warn!(term = %term, "Blocked term detected in query");
            return Err(Rejection::Blocked);
        }

        if let Some(pattern) = self.blocked_patterns.iter().find(|p| p.is_match(query)) {
            tracing::warn!(pattern = %pattern.as_str(), "Blocked pattern matched query");
            return Err(Rejection::Blocked);
        }

        Ok(trimmed)
    }
}
