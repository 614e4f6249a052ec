//! Configuration types module
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a working configuration.

pub mod engine;
pub mod provider;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Content index settings
    #[serde(default)]
    pub index: engine::IndexConfig,

    /// Retrieval settings
    #[serde(default)]
    pub retrieval: engine::RetrievalConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: engine::CacheConfig,

    /// Rate limiter settings
    #[serde(default)]
    pub rate_limit: engine::RateLimitConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: provider::EmbeddingConfig,

    /// Completion provider settings
    #[serde(default)]
    pub completion: provider::CompletionConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the config file and environment variables
    ///
    /// Layering: defaults < config file (if present) < environment.
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}
