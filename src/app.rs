//! Service wiring
//!
//! Builds every shared service from a [`Config`] once at startup. Nothing is
//! a module-level singleton; tests build isolated instances the same way.

use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::ResponseCache;
use crate::config::{Config, EmbeddingBackend};
use crate::core::{CompletionProvider, EmbeddingProvider};
use crate::embedding::{CachedEmbedder, HashingEmbedder, HttpEmbeddingProvider};
use crate::error::{Error, Result};
use crate::index::{ContentIndex, ContentSync};
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::provider::{ExtractiveCompletion, OpenRouterCompletion};
use crate::ratelimit::RateLimiter;
use crate::retrieval::RetrievalEngine;

/// How long memoized query embeddings live
const EMBEDDING_MEMO_TTL: Duration = Duration::from_secs(60 * 60);

/// Every long-lived service, constructed once
#[derive(Clone)]
pub struct AppServices {
    /// Semantic index
    pub index: Arc<ContentIndex>,
    /// Content store notification sink
    pub sync: ContentSync,
    /// Query pipeline
    pub orchestrator: Arc<Orchestrator>,
}

impl AppServices {
    /// Build services from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = build_embedder(config)?;
        if embedder.dimensions() != config.index.dimensions {
            return Err(Error::Config(format!(
                "Embedding provider '{}' produces {} dimensions but index.dimensions is {}",
                embedder.name(),
                embedder.dimensions(),
                config.index.dimensions
            )));
        }
        let completion = build_completion(config)?;

        Ok(Self::with_providers(config, embedder, completion))
    }

    /// Build services around explicit providers
    pub fn with_providers(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let index = Arc::new(ContentIndex::new(config.index.dimensions));
        let sync = ContentSync::new(index.clone(), embedder.clone());

        let retrieval = Arc::new(RetrievalEngine::new(
            index.clone(),
            embedder.clone(),
            config.retrieval.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(
            config.cache.capacity,
            config.cache.ttl,
            index.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        info!(
            "Services ready: embeddings={}, completion={}, dimensions={}",
            embedder.name(),
            completion.name(),
            config.index.dimensions
        );

        let orchestrator = Arc::new(Orchestrator::new(
            limiter,
            cache,
            retrieval,
            completion,
            OrchestratorOptions::from_config(config),
        ));

        AppServices {
            index,
            sync,
            orchestrator,
        }
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.index.dimensions))),
        EmbeddingBackend::Http => {
            let base_url = embedding.base_url.as_deref().ok_or_else(|| {
                Error::Config("embedding.base_url is required for the http provider".to_string())
            })?;
            let provider = HttpEmbeddingProvider::new(
                base_url,
                embedding.api_key.as_ref(),
                embedding.model.clone(),
                config.index.dimensions,
                Duration::from_secs(embedding.timeout_secs),
            )?;
            Ok(Arc::new(CachedEmbedder::new(
                provider,
                embedding.cache_capacity,
                EMBEDDING_MEMO_TTL,
            )))
        }
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => {
            let provider = crate::embedding::LocalEmbeddingProvider::new()?;
            Ok(Arc::new(CachedEmbedder::new(
                provider,
                embedding.cache_capacity,
                EMBEDDING_MEMO_TTL,
            )))
        }
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(Error::Config(
            "local embeddings require the `local-embeddings` feature".to_string(),
        )),
    }
}

fn build_completion(config: &Config) -> Result<Arc<dyn CompletionProvider>> {
    let has_key = config
        .completion
        .api_key
        .as_ref()
        .map_or(false, |k| !k.expose_secret().is_empty());

    if has_key {
        Ok(Arc::new(OpenRouterCompletion::new(&config.completion)?))
    } else {
        info!("No completion API key configured, using extractive answers");
        Ok(Arc::new(ExtractiveCompletion))
    }
}
