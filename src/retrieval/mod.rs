//! Retrieval engine - free-text query + scope -> ranked citations
//!
//! Pipeline:
//! 1. Normalize and validate the query
//! 2. Embed it (provider failures propagate, never an empty result)
//! 3. Over-fetch candidates from the content index within the scope
//! 4. Cap citations per thread for source diversity
//! 5. Build excerpts and display scores

pub mod context;
pub mod excerpt;
pub mod query;

pub use context::GroundingContext;
pub use excerpt::{build_excerpt, truncate_prefix};
pub use query::{normalize_query, Hint, Intent, ProcessedQuery};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::core::{source_url, Citation, ContentId, ContentKind, EmbeddingProvider, Scope};
use crate::error::{Error, ProviderFailure, Result};
use crate::index::{ContentIndex, SearchHit};

/// Citations for one query
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// The processed query
    pub query: ProcessedQuery,
    /// Ranked citations, best first
    pub citations: Vec<Citation>,
}

/// Turns queries into citation lists
pub struct RetrievalEngine {
    index: Arc<ContentIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create a new engine over `index`
    pub fn new(
        index: Arc<ContentIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        RetrievalEngine {
            index,
            embedder,
            config,
        }
    }

    /// Retrieval settings
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The searched index
    pub fn index(&self) -> &Arc<ContentIndex> {
        &self.index
    }

    /// Resolve the requested citation count against the configured bounds
    pub fn resolve_k(&self, k: Option<usize>) -> Result<usize> {
        let k = k.unwrap_or(self.config.default_k);
        if k == 0 {
            return Err(Error::Validation("k must be at least 1".to_string()));
        }
        if k > self.config.max_k {
            return Err(Error::Validation(format!(
                "k must be at most {}, got {}",
                self.config.max_k, k
            )));
        }
        Ok(k)
    }

    /// Normalize and validate a raw query
    pub fn prepare(&self, query: &str) -> Result<ProcessedQuery> {
        let processed = ProcessedQuery::new(query);
        if processed.is_empty() {
            return Err(Error::Validation("Query must not be empty".to_string()));
        }

        let length = processed.normalized.chars().count();
        if length > self.config.max_query_chars {
            return Err(Error::Validation(format!(
                "Query is {} characters, the maximum is {}",
                length, self.config.max_query_chars
            )));
        }

        Ok(processed)
    }

    /// Check that `scope` refers to content that still exists. A thread scope
    /// must name a post; comments do not head threads.
    pub fn check_scope(&self, scope: &Scope) -> Result<()> {
        let Scope::Thread(thread) = scope else {
            return Ok(());
        };
        match self.index.metadata(*thread) {
            None => Err(Error::NotFound(format!("Thread {} does not exist", thread))),
            Some(meta) if meta.kind != ContentKind::Post => Err(Error::NotFound(format!(
                "Thread {} does not exist: it is a comment",
                thread
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Retrieve up to `k` citations for `query` within `scope`
    pub async fn retrieve(&self, query: &str, scope: &Scope, k: usize) -> Result<RetrievalOutcome> {
        let processed = self.prepare(query)?;
        self.retrieve_processed(processed, scope, k).await
    }

    /// Retrieve for an already validated query
    pub async fn retrieve_processed(
        &self,
        query: ProcessedQuery,
        scope: &Scope,
        k: usize,
    ) -> Result<RetrievalOutcome> {
        if k == 0 {
            return Err(Error::Validation("k must be at least 1".to_string()));
        }
        self.check_scope(scope)?;

        let vector = self.embedder.embed(&query.normalized).await?;
        if vector.len() != self.index.dimensions() {
            return Err(Error::provider(
                self.embedder.name(),
                ProviderFailure::Upstream,
                format!(
                    "returned {} dimensions, index expects {}",
                    vector.len(),
                    self.index.dimensions()
                ),
            ));
        }

        let fetch = k.saturating_mul(self.config.candidate_multiplier.max(1));
        let candidates: Vec<SearchHit> = self
            .index
            .search(&vector, fetch, scope)
            .into_iter()
            .filter(|hit| hit.similarity > self.config.min_similarity)
            .collect();

        let selected = diversify(candidates, k, self.config.max_per_parent);
        let citations: Vec<Citation> = selected
            .iter()
            .map(|hit| self.citation(hit, &query.keywords))
            .collect();

        debug!(
            "Retrieved {} citations for '{}' in scope {}",
            citations.len(),
            query.normalized,
            scope
        );

        Ok(RetrievalOutcome {
            query,
            citations,
        })
    }

    fn citation(&self, hit: &SearchHit, keywords: &[String]) -> Citation {
        let meta = &hit.metadata;
        Citation {
            content_id: hit.id,
            kind: meta.kind,
            title: meta.title.clone(),
            excerpt: build_excerpt(&meta.text, keywords, self.config.excerpt_chars),
            relevance_score: display_score(hit.similarity),
            source_url: source_url(hit.id, meta.kind, meta.parent_id),
            parent_id: meta.parent_id,
            author: meta.author.clone(),
            created_at: meta.created_at,
            revision: hit.revision,
        }
    }
}

/// Keep at most `max_per_parent` hits from any one thread, unless the
/// candidates span fewer than `k` threads. Rank order is preserved.
fn diversify(candidates: Vec<SearchHit>, k: usize, max_per_parent: usize) -> Vec<SearchHit> {
    let threads: HashSet<ContentId> = candidates
        .iter()
        .map(|hit| hit.metadata.thread_of(hit.id))
        .collect();

    if threads.len() < k {
        return candidates.into_iter().take(k).collect();
    }

    let mut per_thread: HashMap<ContentId, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(k);
    for hit in candidates {
        let taken = per_thread.entry(hit.metadata.thread_of(hit.id)).or_insert(0);
        if *taken >= max_per_parent {
            continue;
        }
        *taken += 1;
        selected.push(hit);
        if selected.len() == k {
            break;
        }
    }
    selected
}

/// Similarity clamped to [0, 1] and rounded to 3 decimals
pub fn display_score(similarity: f32) -> f32 {
    let clamped = if similarity.is_finite() {
        similarity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (clamped * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContentItem, IndexMetadata};
    use crate::embedding::HashingEmbedder;
    use crate::index::ContentSync;

    async fn engine_with(items: &[ContentItem]) -> RetrievalEngine {
        let index = Arc::new(ContentIndex::new(256));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(256));
        ContentSync::new(index.clone(), embedder.clone())
            .on_upsert_batch(items)
            .await
            .unwrap();
        RetrievalEngine::new(index, embedder, RetrievalConfig::default())
    }

    fn hit(id: u64, parent: Option<u64>, similarity: f32) -> SearchHit {
        let item = match parent {
            Some(p) => ContentItem::comment(id, p, "text"),
            None => ContentItem::post(id, "title", "text"),
        };
        SearchHit {
            id: ContentId(id),
            similarity,
            revision: 1,
            metadata: Arc::new(IndexMetadata::from(&item)),
        }
    }

    #[tokio::test]
    async fn test_empty_index_yields_no_citations() {
        let engine = engine_with(&[]).await;
        let outcome = engine.retrieve("rust ownership", &Scope::Global, 5).await.unwrap();
        assert!(outcome.citations.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let engine = engine_with(&[]).await;
        let err = engine.retrieve("   \n ", &Scope::Global, 5).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_overlong_query_is_validation_error() {
        let engine = engine_with(&[]).await;
        let query = "a".repeat(2001);
        assert!(matches!(
            engine.retrieve(&query, &Scope::Global, 5).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_thread_is_not_found() {
        let engine = engine_with(&[ContentItem::post(1, "Borrowing", "borrow checker")]).await;
        assert!(matches!(
            engine.retrieve("borrow", &Scope::Thread(ContentId(99)), 5).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_is_not_a_thread() {
        let engine = engine_with(&[
            ContentItem::post(1, "Borrowing", "borrow checker"),
            ContentItem::comment(2, 1, "the borrow checker rejects aliasing"),
        ])
        .await;

        assert!(matches!(
            engine.retrieve("borrow", &Scope::Thread(ContentId(2)), 5).await,
            Err(Error::NotFound(_))
        ));
        let outcome = engine
            .retrieve("borrow", &Scope::Thread(ContentId(1)), 5)
            .await
            .unwrap();
        assert_eq!(outcome.citations.len(), 2);
    }

    #[tokio::test]
    async fn test_ranked_citations() {
        let engine = engine_with(&[
            ContentItem::post(1, "Borrow checker explained", "How the borrow checker tracks loans.")
                .by("ferris"),
            ContentItem::post(2, "Async runtimes", "Comparing tokio and smol executors."),
            ContentItem::comment(3, 1, "The borrow checker rejects two mutable borrows."),
        ])
        .await;

        let outcome = engine
            .retrieve("explain the borrow checker", &Scope::Global, 3)
            .await
            .unwrap();
        let citations = outcome.citations;

        assert!(!citations.is_empty());
        assert!(citations.len() <= 3);
        assert_eq!(citations[0].content_id, ContentId(1));
        assert_eq!(citations[0].source_url, "/posts/1");
        assert_eq!(citations[0].author.as_deref(), Some("ferris"));
        for pair in citations.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
        for c in &citations {
            assert!((0.0..=1.0).contains(&c.relevance_score));
        }

        let ids: HashSet<_> = citations.iter().map(|c| c.content_id).collect();
        assert_eq!(ids.len(), citations.len());
    }

    #[test]
    fn test_diversify_caps_threads() {
        let candidates = vec![
            hit(1, None, 0.9),
            hit(2, Some(1), 0.85),
            hit(3, Some(1), 0.8),
            hit(4, None, 0.7),
            hit(5, None, 0.6),
        ];
        let ids: Vec<u64> = diversify(candidates, 3, 2).iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_diversify_skips_cap_with_few_threads() {
        let candidates = vec![
            hit(1, None, 0.9),
            hit(2, Some(1), 0.85),
            hit(3, Some(1), 0.8),
            hit(4, None, 0.7),
        ];
        // Only two threads for k = 3: the cap would starve the result
        let ids: Vec<u64> = diversify(candidates, 3, 2).iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_display_score() {
        assert_eq!(display_score(0.123456), 0.123);
        assert_eq!(display_score(1.2), 1.0);
        assert_eq!(display_score(-0.4), 0.0);
        assert_eq!(display_score(f32::NAN), 0.0);
    }

    #[test]
    fn test_resolve_k() {
        let engine = RetrievalEngine::new(
            Arc::new(ContentIndex::new(4)),
            Arc::new(HashingEmbedder::new(4)),
            RetrievalConfig::default(),
        );
        assert_eq!(engine.resolve_k(None).unwrap(), 5);
        assert_eq!(engine.resolve_k(Some(20)).unwrap(), 20);
        assert!(engine.resolve_k(Some(0)).is_err());
        assert!(engine.resolve_k(Some(21)).is_err());
    }
}
