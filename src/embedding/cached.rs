//! In-process memo for embeddings
//!
//! Uses moka async cache (Send + Sync, TTL-based eviction).
//! Repeated questions skip the provider round-trip for the query vector.

use async_trait::async_trait;
use moka::future::Cache;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use crate::core::EmbeddingProvider;
use crate::error::Result;

/// Cache key helper: hash a string to u64
fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Embedding provider wrapper that memoizes vectors by text
pub struct CachedEmbedder<P> {
    inner: P,
    embeddings: Cache<u64, Vec<f32>>,
}

impl<P: EmbeddingProvider> CachedEmbedder<P> {
    /// Wrap `inner`, keeping at most `capacity` vectors for `ttl`
    pub fn new(inner: P, capacity: u64, ttl: Duration) -> Self {
        CachedEmbedder {
            inner,
            embeddings: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Number of memoized vectors
    pub fn entry_count(&self) -> u64 {
        self.embeddings.entry_count()
    }

    /// Apply pending inserts and evictions
    pub async fn sync(&self) {
        self.embeddings.run_pending_tasks().await;
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_key(text);
        if let Some(cached) = self.embeddings.get(&key).await {
            return Ok(cached);
        }

        let embedding = self.inner.embed(text).await?;
        self.embeddings.insert(key, embedding.clone()).await;
        Ok(embedding)
    }
}
