//! Router module for tier selection.
//!
//! This module handles:
//! - Classifying query complexity with a cheap model
//! - Mapping the classification (or an explicit override) to a model tier
//! - Issuing the generation call on the selected tier

mod classifier;
mod dispatcher;

use serde::{Deserialize, Serialize};

pub use classifier::{
    parse_classification, Classification, ClassificationError, ClassificationSource, QueryRouter,
};
pub use dispatcher::{select_tier, Dispatcher, Generation, SelectionBasis, TierChoice};

/// Complexity label assigned to a query by the router model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Uppercase label as used in prompts and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "SIMPLE",
            Complexity::Moderate => "MODERATE",
            Complexity::Complex => "COMPLEX",
        }
    }

    /// Parse a label, ignoring case and surrounding punctuation.
    pub fn parse(s: &str) -> Option<Self> {
        let cleaned = s
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_uppercase();
        match cleaned.as_str() {
            "SIMPLE" => Some(Complexity::Simple),
            "MODERATE" => Some(Complexity::Moderate),
            "COMPLEX" => Some(Complexity::Complex),
            _ => None,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two generation tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Large,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Large => "large",
        }
    }

    /// Parse a `force_model` value. Only the exact tier names are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Some(ModelTier::Small),
            "large" => Some(ModelTier::Large),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
