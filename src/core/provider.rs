//! Provider traits - Abstract interfaces for the model backends
//!
//! Two external collaborators sit behind these traits:
//! - `EmbeddingProvider`: text -> fixed-dimension vector
//! - `CompletionProvider`: (prompt, grounding excerpts) -> generated text
//!
//! Both may block on the network, so callers must never hold an index,
//! cache or limiter lock across these calls.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ProviderFailure, Result};
use crate::retrieval::GroundingContext;

/// Maps text to a fixed-dimension vector
///
/// Implementations must be deterministic for a fixed model version.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier, used in logs and errors
    fn name(&self) -> &str;

    /// Dimension of every returned vector
    fn dimensions(&self) -> usize;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Options for answer generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model to use (provider-specific)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0-2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Generates the final natural-language answer from retrieved excerpts
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier, used in logs and errors
    fn name(&self) -> &str;

    /// Generate an answer to `prompt` anchored in `grounding`
    async fn complete(
        &self,
        prompt: &str,
        grounding: &GroundingContext,
        options: &GenerationOptions,
    ) -> Result<String>;
}

/// Classify a non-success HTTP response from a model provider
pub fn classify_status(status: StatusCode, body: &str) -> ProviderFailure {
    let lowered = body.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS || lowered.contains("insufficient_quota") {
        ProviderFailure::QuotaExceeded
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ProviderFailure::Timeout
    } else if status.is_client_error()
        && (lowered.contains("content_policy") || lowered.contains("content_filter"))
    {
        ProviderFailure::ContentPolicy
    } else {
        ProviderFailure::Upstream
    }
}

/// Convert a transport error into a provider error
pub fn transport_error(provider: &str, err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ProviderFailure::Timeout
    } else {
        ProviderFailure::Upstream
    };
    Error::provider(provider, kind, err.to_string())
}
