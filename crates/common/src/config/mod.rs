//! Configuration management for AcuKG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Legacy variable names (DASHSCOPE_*, QWEN_MODEL_*, NEO4J_*)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Text generation service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Vocabulary cache and fuzzy matching
    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    /// QA pipeline behaviour
    #[serde(default)]
    pub qa: QaConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// API key (bearer token)
    #[serde(default)]
    pub api_key: String,

    /// Model used for intent parsing
    #[serde(default = "default_llm_model")]
    pub parse_model: String,

    /// Model used for answer synthesis
    #[serde(default = "default_llm_model")]
    pub answer_model: String,

    #[serde(default = "default_parse_temperature")]
    pub parse_temperature: f32,

    /// Temperature for answers grounded in graph records
    #[serde(default = "default_grounded_temperature")]
    pub grounded_temperature: f32,

    /// Temperature for answers from general knowledge only
    #[serde(default = "default_general_temperature")]
    pub general_temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint (bolt:// URIs are mapped to http://host:7474)
    #[serde(default = "default_graph_uri")]
    pub uri: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VocabularyConfig {
    /// Cache TTL in seconds; unset means the vocabulary is loaded once
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Minimum similarity ratio for adopting a vocabulary name
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,

    /// Maximum number of candidates ranked per mention
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Minimum similarity ratio for suggesting names for unmatched mentions
    #[serde(default = "default_suggest_cutoff")]
    pub suggest_cutoff: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaConfig {
    /// Result cap used when the request carries no `max_plans`
    #[serde(default = "default_max_plans")]
    pub default_max_plans: usize,

    /// Most recent user/assistant turns forwarded to the model
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Answer from an empty record set instead of failing when the graph query errors
    #[serde(default = "default_degrade_on_store_error")]
    pub degrade_on_store_error: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://127.0.0.1:5500".to_string(),
        "http://localhost:5500".to_string(),
    ]
}
fn default_llm_base_url() -> String { "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string() }
fn default_llm_model() -> String { "qwen3-max".to_string() }
fn default_parse_temperature() -> f32 { 0.1 }
fn default_grounded_temperature() -> f32 { 0.3 }
fn default_general_temperature() -> f32 { 0.5 }
fn default_llm_timeout() -> u64 { 60 }
fn default_graph_uri() -> String { "http://localhost:7474".to_string() }
fn default_graph_user() -> String { "neo4j".to_string() }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_graph_timeout() -> u64 { 30 }
fn default_cutoff() -> f64 { 0.7 }
fn default_top_n() -> usize { 5 }
fn default_suggest_cutoff() -> f64 { 0.5 }
fn default_max_plans() -> usize { 10 }
fn default_max_history_turns() -> usize { 20 }
fn default_degrade_on_store_error() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "acukg-qa".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__VOCABULARY__CUTOFF=0.75
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )

            // Legacy variable names take precedence over everything else
            .set_override_option("llm.base_url", env_var("DASHSCOPE_BASE_URL"))?
            .set_override_option("llm.api_key", env_var("DASHSCOPE_API_KEY"))?
            .set_override_option("llm.parse_model", env_var("QWEN_MODEL_PARSE"))?
            .set_override_option("llm.answer_model", env_var("QWEN_MODEL_ANSWER"))?
            .set_override_option("graph.uri", env_var("NEO4J_URI"))?
            .set_override_option("graph.user", env_var("NEO4J_USER"))?
            .set_override_option("graph.password", env_var("NEO4J_PASSWORD"))?

            .build()?;

        config.try_deserialize()
    }

    /// Check settings the service cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(AppError::Configuration {
                message: "llm.api_key is not set (APP__LLM__API_KEY or DASHSCOPE_API_KEY)".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.vocabulary.cutoff)
            || !(0.0..=1.0).contains(&self.vocabulary.suggest_cutoff)
        {
            return Err(AppError::Configuration {
                message: "vocabulary cutoffs must be within [0, 1]".to_string(),
            });
        }
        if self.vocabulary.suggest_cutoff > self.vocabulary.cutoff {
            return Err(AppError::Configuration {
                message: "vocabulary.suggest_cutoff must not exceed vocabulary.cutoff".to_string(),
            });
        }
        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the vocabulary TTL as Duration, if any
    pub fn vocabulary_ttl(&self) -> Option<Duration> {
        self.vocabulary.ttl_secs.map(Duration::from_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            parse_model: default_llm_model(),
            answer_model: default_llm_model(),
            parse_temperature: default_parse_temperature(),
            grounded_temperature: default_grounded_temperature(),
            general_temperature: default_general_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_graph_uri(),
            user: default_graph_user(),
            password: String::new(),
            database: default_graph_database(),
            timeout_secs: default_graph_timeout(),
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            cutoff: default_cutoff(),
            top_n: default_top_n(),
            suggest_cutoff: default_suggest_cutoff(),
        }
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            default_max_plans: default_max_plans(),
            max_history_turns: default_max_history_turns(),
            degrade_on_store_error: default_degrade_on_store_error(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            graph: GraphConfig::default(),
            vocabulary: VocabularyConfig::default(),
            qa: QaConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
