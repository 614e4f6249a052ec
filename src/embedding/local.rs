//! In-process embeddings with fastembed
//!
//! Runs multilingual-e5-small (384 dimensions) on the blocking pool. The ONNX
//! model is fetched into the fastembed cache the first time it is built.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

use crate::core::EmbeddingProvider;
use crate::error::{Error, ProviderFailure, Result};

const PROVIDER: &str = "fastembed";

const DIMENSIONS: usize = 384;

/// Embeds content and queries without leaving the process
#[derive(Clone)]
pub struct LocalEmbeddingProvider {
    model: Arc<TextEmbedding>,
}

impl LocalEmbeddingProvider {
    /// Load the model, downloading it if needed
    pub fn new() -> Result<Self> {
        let options =
            InitOptions::new(EmbeddingModel::MultilingualE5Small).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options).map_err(|e| {
            Error::Config(format!("Could not load local embedding model: {}", e))
        })?;

        Ok(LocalEmbeddingProvider {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::provider(PROVIDER, ProviderFailure::Upstream, "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| Error::provider(PROVIDER, ProviderFailure::Upstream, e.to_string()))
        })
        .await
        .map_err(|e| Error::Internal(format!("fastembed worker panicked: {}", e)))?
    }
}
