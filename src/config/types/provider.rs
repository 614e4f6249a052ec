//! Provider configuration types
//!
//! Configuration for the embedding and completion backends.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Which embedding backend to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature hashing (no network)
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
    /// fastembed model (requires the `local-embeddings` feature)
    Local,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "hashing" | "hash" => Ok(EmbeddingBackend::Hashing),
            "http" | "remote" => Ok(EmbeddingBackend::Http),
            "local" | "fastembed" => Ok(EmbeddingBackend::Local),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid embedding provider: {}. Valid options: hashing, http, local",
                s
            ))),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend
    #[serde(default)]
    pub provider: EmbeddingBackend,
    /// Base URL for the http backend
    pub base_url: Option<String>,
    /// API key for the http backend
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,
    /// Model name for the http backend
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Memoized query embeddings
    #[serde(default = "default_embedding_cache")]
    pub cache_capacity: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: EmbeddingBackend::default(),
            base_url: None,
            api_key: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
            cache_capacity: default_embedding_cache(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout() -> u64 {
    15
}

fn default_embedding_cache() -> u64 {
    1000
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API key; without one the extractive fallback answers
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,
    /// Base URL
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    /// Model
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    /// Retries for retryable provider failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            api_key: None,
            base_url: default_completion_url(),
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_completion_timeout(),
            max_retries: default_retries(),
        }
    }
}

fn default_completion_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_completion_model() -> String {
    "anthropic/claude-3.5-haiku".to_string()
}

fn default_max_tokens() -> u32 {
    1200
}

fn default_temperature() -> f32 {
    0.7
}

fn default_completion_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    2
}
