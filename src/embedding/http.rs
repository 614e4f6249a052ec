//! OpenAI-compatible embeddings endpoint client

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::provider::{classify_status, transport_error};
use crate::core::EmbeddingProvider;
use crate::error::{Error, ProviderFailure, Result};

const PROVIDER: &str = "http-embeddings";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Remote embedding provider speaking the `/embeddings` wire format
#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbeddingProvider {
    /// Create a new client
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&SecretString>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.expose_secret().is_empty()) {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                    .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(HttpEmbeddingProvider {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!("Requesting {} embeddings from {}", input.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                classify_status(status, &body),
                format!("API error ({}): {}", status, body),
            ));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, ProviderFailure::Upstream, e.to_string()))?;
        body.data.sort_by_key(|d| d.index);

        if body.data.len() != input.len() {
            return Err(Error::provider(
                PROVIDER,
                ProviderFailure::Upstream,
                format!("expected {} embeddings, got {}", input.len(), body.data.len()),
            ));
        }
        if let Some(bad) = body.data.iter().find(|d| d.embedding.len() != self.dimensions) {
            return Err(Error::provider(
                PROVIDER,
                ProviderFailure::Upstream,
                format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    bad.embedding.len()
                ),
            ));
        }

        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::provider(PROVIDER, ProviderFailure::Upstream, "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
