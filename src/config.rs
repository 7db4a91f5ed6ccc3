//! Configuration parsing and validation for tierroute.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

use crate::router::Complexity;

/// Smallest accepted `max_output_length`. The output guard reserves room
/// for its truncation notice below this.
pub const MIN_OUTPUT_LENGTH: usize = 64;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub models: ModelsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Total timeout for a single outbound model call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Connect timeout for outbound model calls, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./tierroute.db".to_string()
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The raw value is only reachable through [`ApiKey::expose_secret`].
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a model's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was auto-discovered from convention env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// A single OpenAI-compatible model endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent upstream and reported as `model_used`
    pub name: String,
    /// Base URL of the chat-completions API (e.g., "https://llm.example.com/v1")
    pub url: String,
    pub api_key: Option<ApiKey>,
    /// Price in USD per 1000 tokens (input and output alike)
    #[serde(default)]
    pub price_per_1k: f64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The two generation tiers plus the classification model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub small: ModelConfig,
    pub large: ModelConfig,
    /// Classification model; the small tier is reused when absent.
    pub router: Option<ModelConfig>,
}

impl ModelsConfig {
    /// Model used for complexity classification.
    pub fn router(&self) -> &ModelConfig {
        self.router.as_ref().unwrap_or(&self.small)
    }
}

/// Routing behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Classification assumed when the router call fails or its answer is unparseable
    #[serde(default = "default_fallback")]
    pub fallback: Complexity,
    /// Confidence reported when the router omits one
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    /// SIMPLE/MODERATE labels below this confidence escalate to the large tier
    pub min_confidence: Option<f64>,
}

fn default_fallback() -> Complexity {
    Complexity::Moderate
}

fn default_confidence() -> f64 {
    0.5
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
            default_confidence: default_confidence(),
            min_confidence: None,
        }
    }
}

/// Input and output guardrail settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailsConfig {
    /// Maximum query length in characters
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Maximum answer length in characters
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,
    /// Case-insensitive substrings that reject a query
    #[serde(default = "default_blocked_terms")]
    pub blocked_terms: Vec<String>,
    /// Regular expressions that reject a query
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    /// System prompt sent with every generation call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_input_length() -> usize {
    10_000
}

fn default_max_output_length() -> usize {
    4096
}

fn default_blocked_terms() -> Vec<String> {
    [
        "ignore previous instructions",
        "ignore all instructions",
        "disregard your instructions",
        "you are now",
        "new instructions:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer accurately and concisely. \
     If you are unsure, say so rather than guessing."
        .to_string()
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_input_length: default_max_input_length(),
            max_output_length: default_max_output_length(),
            blocked_terms: default_blocked_terms(),
            blocked_patterns: Vec::new(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Whether to write cost records to the database
    #[serde(default = "default_true")]
    pub log_costs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_costs: true,
        }
    }
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let models = [
            ("small", &self.models.small),
            ("large", &self.models.large),
            ("router", self.models.router()),
        ];
        for (label, model) in models {
            if model.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Model '{}' has empty name",
                    label
                )));
            }
            if model.url.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Model '{}' has empty URL",
                    label
                )));
            }
            if !model.price_per_1k.is_finite() || model.price_per_1k < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Model '{}' has invalid price_per_1k {}",
                    label, model.price_per_1k
                )));
            }
        }

        if self.models.large.price_per_1k == 0.0 {
            tracing::warn!("Large tier price is zero - savings will always report 0%");
        }

        if !(0.0..=1.0).contains(&self.routing.default_confidence) {
            return Err(ConfigError::Validation(format!(
                "routing.default_confidence must be within [0, 1], got {}",
                self.routing.default_confidence
            )));
        }
        if let Some(min) = self.routing.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(ConfigError::Validation(format!(
                    "routing.min_confidence must be within [0, 1], got {}",
                    min
                )));
            }
        }

        if self.guardrails.max_input_length == 0 {
            return Err(ConfigError::Validation(
                "guardrails.max_input_length must be greater than zero".to_string(),
            ));
        }
        if self.guardrails.max_output_length < MIN_OUTPUT_LENGTH {
            return Err(ConfigError::Validation(format!(
                "guardrails.max_output_length must be at least {}",
                MIN_OUTPUT_LENGTH
            )));
        }
        for pattern in &self.guardrails.blocked_patterns {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid blocked pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for model '{model}': {message}")]
    EnvVar {
        var: String,
        model: String,
        message: String,
    },
}

/// Raw model config deserialized directly from TOML.
/// `url` and `api_key` may contain `${VAR}` references not yet expanded.
#[derive(Deserialize)]
pub struct RawModelConfig {
    name: String,
    url: String,
    api_key: Option<String>,
    #[serde(default)]
    price_per_1k: f64,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub struct RawModelsConfig {
    small: RawModelConfig,
    large: RawModelConfig,
    router: Option<RawModelConfig>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    database: Option<DatabaseConfig>,
    models: RawModelsConfig,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    guardrails: GuardrailsConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, model_label: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            model: model_label.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                model: model_label.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            model: model_label.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in model '{}')",
                var_name, model_label
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn expand_env_vars(input: &str, model_label: &str) -> Result<String, ConfigError> {
    expand_env_vars_with(input, model_label, |name| std::env::var(name).ok())
}

/// Derive the convention-based env var name for a model slot.
///
/// - "small" -> "TIERROUTE_SMALL_API_KEY"
/// - "large" -> "TIERROUTE_LARGE_API_KEY"
/// - "router" -> "TIERROUTE_ROUTER_API_KEY"
pub fn convention_env_var_name(model_label: &str) -> String {
    let upper_snake = model_label.to_uppercase().replace(['-', ' '], "_");
    format!("TIERROUTE_{}_API_KEY", upper_snake)
}

fn convention_key_lookup(model_label: &str) -> Option<(String, String)> {
    let var_name = convention_env_var_name(model_label);
    std::env::var(&var_name).ok().map(|value| (var_name, value))
}

fn resolve_model(
    label: &str,
    raw: RawModelConfig,
) -> Result<(ModelConfig, KeySource), ConfigError> {
    let (api_key, source) = match raw.api_key {
        Some(ref raw_key) if raw_key.contains("${") => {
            let expanded = expand_env_vars(raw_key, label)?;
            (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
        }
        Some(ref raw_key) => (Some(ApiKey::from(raw_key.as_str())), KeySource::Literal),
        None => match convention_key_lookup(label) {
            Some((var_name, value)) => (Some(ApiKey::from(value)), KeySource::Convention(var_name)),
            None => (None, KeySource::None),
        },
    };

    let model = ModelConfig {
        name: raw.name,
        url: expand_env_vars(&raw.url, label)?,
        api_key,
        price_per_1k: raw.price_per_1k,
        temperature: raw.temperature,
        max_tokens: raw.max_tokens,
    };

    Ok((model, source))
}

impl Config {
    /// Convert raw (deserialized) config to final config with env var expansion.
    ///
    /// For each model slot:
    /// - If `api_key` contains `${VAR}`: expand from environment, source = `EnvExpanded`
    /// - If `api_key` is a literal string: wrap directly, source = `Literal`
    /// - If `api_key` is absent: try `TIERROUTE_<SLOT>_API_KEY`,
    ///   source = `Convention(var_name)` or `KeySource::None`
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let mut key_sources = Vec::with_capacity(3);

        let (small, source) = resolve_model("small", raw.models.small)?;
        key_sources.push(("small".to_string(), source));

        let (large, source) = resolve_model("large", raw.models.large)?;
        key_sources.push(("large".to_string(), source));

        let router = match raw.models.router {
            Some(raw_router) => {
                let (router, source) = resolve_model("router", raw_router)?;
                key_sources.push(("router".to_string(), source));
                Some(router)
            }
            None => None,
        };

        let config = Config {
            server: raw.server,
            database: raw.database,
            models: ModelsConfig {
                small,
                large,
                router,
            },
            routing: raw.routing,
            guardrails: raw.guardrails,
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Load configuration from a TOML file with environment variable expansion.
    ///
    /// Returns the config and per-model key source information.
    pub fn from_file_with_env(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
        let (config, key_sources) = Self::from_raw(raw)?;
        config.validate()?;

        Ok((config, key_sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [models.small]
        name = "flash"
        url = "https://small.example.com/v1"
        price_per_1k = 0.000375

        [models.large]
        name = "pro"
        url = "https://large.example.com/v1"
        price_per_1k = 0.00625
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_str(MINIMAL).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8000");
        assert_eq!(config.models.small.name, "flash");
        assert_eq!(config.models.large.price_per_1k, 0.00625);
        assert_eq!(config.routing.fallback, Complexity::Moderate);
        assert_eq!(config.routing.default_confidence, 0.5);
        assert!(config.routing.min_confidence.is_none());
        assert_eq!(config.guardrails.max_input_length, 10_000);
        assert!(config
            .guardrails
            .blocked_terms
            .iter()
            .any(|t| t == "ignore previous instructions"));
    }

    #[test]
    fn test_router_defaults_to_small_model() {
        let config = Config::parse_str(MINIMAL).unwrap();
        assert_eq!(config.models.router().name, "flash");
        assert_eq!(config.models.router().url, "https://small.example.com/v1");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:9000"
            request_timeout_secs = 30

            [database]
            path = "./test.db"

            [models.small]
            name = "flash"
            url = "https://small.example.com/v1"
            price_per_1k = 0.000375
            temperature = 0.2
            max_tokens = 512

            [models.large]
            name = "pro"
            url = "https://large.example.com/v1"
            price_per_1k = 0.00625

            [models.router]
            name = "flash-lite"
            url = "https://router.example.com/v1"
            price_per_1k = 0.0001

            [routing]
            fallback = "complex"
            default_confidence = 0.4
            min_confidence = 0.6

            [guardrails]
            max_input_length = 500
            max_output_length = 2000
            blocked_terms = ["forbidden"]
            blocked_patterns = ["(?i)jail\\s*break"]
            system_prompt = "Be brief."

            [logging]
            level = "debug"
            format = "json"
            log_costs = false
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.server.connect_timeout_secs, 10);
        assert_eq!(config.database.as_ref().unwrap().path, "./test.db");
        assert_eq!(config.models.small.max_tokens, Some(512));
        assert_eq!(config.models.router().name, "flash-lite");
        assert_eq!(config.routing.fallback, Complexity::Complex);
        assert_eq!(config.routing.min_confidence, Some(0.6));
        assert_eq!(config.guardrails.blocked_terms, vec!["forbidden"]);
        assert_eq!(config.guardrails.system_prompt, "Be brief.");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.logging.log_costs);
    }

    #[test]
    fn test_missing_models_section_fails() {
        let result = Config::parse_str("[server]\nlisten = \"127.0.0.1:1\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_negative_price_rejected() {
        let toml = MINIMAL.replace("0.00625", "-1.0");
        let err = Config::parse_str(&toml).unwrap_err().to_string();
        assert!(err.contains("price_per_1k"), "{}", err);
    }

    #[test]
    fn test_empty_url_rejected() {
        let toml = MINIMAL.replace("https://large.example.com/v1", "");
        let err = Config::parse_str(&toml).unwrap_err().to_string();
        assert!(err.contains("empty URL"), "{}", err);
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let toml = format!("{}\n[routing]\nmin_confidence = 1.5\n", MINIMAL);
        let err = Config::parse_str(&toml).unwrap_err().to_string();
        assert!(err.contains("min_confidence"), "{}", err);
    }

    #[test]
    fn test_invalid_blocked_pattern_rejected() {
        let toml = format!("{}\n[guardrails]\nblocked_patterns = [\"(unclosed\"]\n", MINIMAL);
        let err = Config::parse_str(&toml).unwrap_err().to_string();
        assert!(err.contains("Invalid blocked pattern"), "{}", err);
    }

    #[test]
    fn test_tiny_output_length_rejected() {
        let toml = format!("{}\n[guardrails]\nmax_output_length = 10\n", MINIMAL);
        assert!(Config::parse_str(&toml).is_err());
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("super-secret-token");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_display_redaction() {
        let key = ApiKey::from("super-secret-token");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("real-secret-value");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_model_config_debug_redaction() {
        let toml = MINIMAL.replace(
            "price_per_1k = 0.000375",
            "price_per_1k = 0.000375\napi_key = \"sk-live-abcdef\"",
        );
        let config = Config::parse_str(&toml).unwrap();
        assert_eq!(
            config.models.small.api_key.as_ref().unwrap().expose_secret(),
            "sk-live-abcdef"
        );
        let debug = format!("{:?}", config.models.small);
        assert!(!debug.contains("sk-live-abcdef"));
        assert!(debug.contains("[REDACTED]"));
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_single_var() {
        let lookup = |name: &str| match name {
            "MY_KEY" => Some("sk-abcd".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${MY_KEY}", "small", lookup).unwrap();
        assert_eq!(result, "sk-abcd");
    }

    #[test]
    fn test_expand_multiple_vars() {
        let lookup = |name: &str| match name {
            "SCHEME" => Some("https".to_string()),
            "HOST" => Some("example.com".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${SCHEME}://${HOST}/v1", "small", lookup).unwrap();
        assert_eq!(result, "https://example.com/v1");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("literal-value", "small", lookup).unwrap();
        assert_eq!(result, "literal-value");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let lookup = |_: &str| None;
        let err = expand_env_vars_with("${MISSING}", "large", lookup)
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("large"), "Error should name the model slot");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "small", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "small", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_convention_env_var_name() {
        assert_eq!(convention_env_var_name("small"), "TIERROUTE_SMALL_API_KEY");
        assert_eq!(convention_env_var_name("router"), "TIERROUTE_ROUTER_API_KEY");
    }

    // ── from_raw integration tests ──

    fn raw_model(name: &str, api_key: Option<String>) -> RawModelConfig {
        RawModelConfig {
            name: name.to_string(),
            url: "https://example.com/v1".to_string(),
            api_key,
            price_per_1k: 0.001,
            temperature: None,
            max_tokens: None,
        }
    }

    fn make_raw_config(small_key: Option<String>, router: Option<RawModelConfig>) -> RawConfig {
        RawConfig {
            server: ServerConfig::default(),
            database: None,
            models: RawModelsConfig {
                small: raw_model("flash", small_key),
                large: raw_model("pro", Some("large-literal".to_string())),
                router,
            },
            routing: RoutingConfig::default(),
            guardrails: GuardrailsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_from_raw_literal_key() {
        let raw = make_raw_config(Some("literal-key-value".to_string()), None);
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources.len(), 2);
        assert_eq!(key_sources[0], ("small".to_string(), KeySource::Literal));
        assert_eq!(
            config.models.small.api_key.as_ref().unwrap().expose_secret(),
            "literal-key-value"
        );
    }

    #[test]
    fn test_from_raw_env_expanded_key() {
        let var_name = "TEST_TIERROUTE_EXPAND_KEY";
        unsafe { std::env::set_var(var_name, "expanded-token") };

        let raw = make_raw_config(Some(format!("${{{}}}", var_name)), None);
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources[0].1, KeySource::EnvExpanded);
        assert_eq!(
            config.models.small.api_key.as_ref().unwrap().expose_secret(),
            "expanded-token"
        );

        unsafe { std::env::remove_var(var_name) };
    }

    #[test]
    fn test_from_raw_router_convention_key() {
        let var_name = convention_env_var_name("router");
        unsafe { std::env::set_var(&var_name, "router-convention-token") };

        let raw = make_raw_config(
            Some("small-key".to_string()),
            Some(raw_model("flash-lite", None)),
        );
        let (config, key_sources) = Config::from_raw(raw).unwrap();

        assert_eq!(key_sources.len(), 3);
        assert_eq!(key_sources[2].1, KeySource::Convention(var_name.clone()));
        assert_eq!(
            config.models.router().api_key.as_ref().unwrap().expose_secret(),
            "router-convention-token"
        );

        unsafe { std::env::remove_var(&var_name) };
    }

    #[test]
    fn test_from_raw_missing_env_var_fails() {
        let var_name = "TEST_TIERROUTE_DEFINITELY_MISSING";
        unsafe { std::env::remove_var(var_name) };

        let raw = make_raw_config(Some(format!("${{{}}}", var_name)), None);
        let err = Config::from_raw(raw).unwrap_err().to_string();
        assert!(err.contains(var_name), "Error should name the variable: {}", err);
        assert!(err.contains("small"), "Error should name the model: {}", err);
    }
}
