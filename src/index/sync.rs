//! Content store notifications -> index mutations
//!
//! The external content store calls into [`ContentSync`] on every create,
//! update and delete. Embeddings are computed with no index lock held; the
//! index is only touched for the final in-memory mutation.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ContentIndex, UpsertOutcome};
use crate::core::{ContentId, ContentItem, EmbeddingProvider, IndexMetadata};
use crate::error::Result;

/// Keeps the content index in step with the content store
#[derive(Clone)]
pub struct ContentSync {
    index: Arc<ContentIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContentSync {
    /// Create a new sync handle
    pub fn new(index: Arc<ContentIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        ContentSync { index, embedder }
    }

    /// Handle a create or update of `item`.
    ///
    /// The embedding is only recomputed when the index does not already hold
    /// `item.revision`. A delete that lands while the embedding is computed
    /// wins: the index rejects the late upsert as [`UpsertOutcome::Stale`].
    pub async fn on_upsert(&self, item: &ContentItem) -> Result<UpsertOutcome> {
        if self.index.is_deleted(item.id) {
            return Ok(UpsertOutcome::Stale);
        }
        if let Some(indexed) = self.index.indexed_revision(item.id) {
            if indexed == item.revision {
                return Ok(UpsertOutcome::Unchanged);
            }
            if indexed > item.revision {
                return Ok(UpsertOutcome::Stale);
            }
            // Old embedding must not rank while the new one is computed
            self.index.mark_revision(item.id, item.revision);
        }

        let vector = self.embedder.embed(&item.searchable_text()).await?;
        let outcome = self
            .index
            .upsert(item.id, vector, IndexMetadata::from(item), item.revision);

        debug!(
            "Indexed {} {} at revision {}: {:?}",
            item.kind, item.id, item.revision, outcome
        );
        Ok(outcome)
    }

    /// Handle a batch of creates/updates, embedding concurrently
    pub async fn on_upsert_batch(&self, items: &[ContentItem]) -> Result<Vec<UpsertOutcome>> {
        let results = join_all(items.iter().map(|item| self.on_upsert(item))).await;
        let outcomes = results.into_iter().collect::<Result<Vec<_>>>()?;

        info!(
            "Synced {} content items ({} indexed total)",
            outcomes.len(),
            self.index.len()
        );
        Ok(outcomes)
    }

    /// Handle a delete. Returns whether an entry was removed; the id is
    /// retired either way.
    pub fn on_delete(&self, id: ContentId) -> bool {
        let removed = self.index.remove(id);
        if removed {
            debug!("Removed content {} from index", id);
        }
        removed
    }

    /// The index this handle writes to
    pub fn index(&self) -> &Arc<ContentIndex> {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scope;
    use crate::embedding::HashingEmbedder;
    use crate::error::{Error, ProviderFailure};
    use crate::index::RevisionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }
    }

    /// Holds every embedding for `delay`
    struct SlowEmbedder {
        inner: HashingEmbedder,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(self.delay).await;
            self.inner.embed(text).await
        }
    }

    fn slow_sync(index: Arc<ContentIndex>) -> ContentSync {
        ContentSync::new(
            index,
            Arc::new(SlowEmbedder {
                inner: HashingEmbedder::new(64),
                delay: std::time::Duration::from_millis(100),
            }),
        )
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            64
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::provider("failing", ProviderFailure::Timeout, "slow"))
        }
    }

    fn setup() -> (ContentSync, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(64),
            calls: AtomicUsize::new(0),
        });
        let index = Arc::new(ContentIndex::new(64));
        (ContentSync::new(index, embedder.clone()), embedder)
    }

    #[tokio::test]
    async fn test_same_revision_skips_embedding() {
        let (sync, embedder) = setup();
        let item = ContentItem::post(1, "Lifetimes", "Lifetimes annotate references");

        assert_eq!(sync.on_upsert(&item).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(sync.on_upsert(&item).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revision_bump_reembeds() {
        let (sync, embedder) = setup();
        let item = ContentItem::post(1, "Lifetimes", "Lifetimes annotate references");
        sync.on_upsert(&item).await.unwrap();

        let edited = item.clone().at_revision(2);
        assert_eq!(sync.on_upsert(&edited).await.unwrap(), UpsertOutcome::Replaced);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sync.index().current_revision(item.id), Some(2));

        let older = item.at_revision(1);
        assert_eq!(sync.on_upsert(&older).await.unwrap(), UpsertOutcome::Stale);
    }

    #[tokio::test]
    async fn test_failed_reembed_keeps_stale_entry_out_of_ranking() {
        let index = Arc::new(ContentIndex::new(64));
        let good = ContentSync::new(index.clone(), Arc::new(HashingEmbedder::new(64)));
        let bad = ContentSync::new(index.clone(), Arc::new(FailingEmbedder));

        let item = ContentItem::post(1, "Traits", "Traits define shared behavior");
        good.on_upsert(&item).await.unwrap();

        let err = bad.on_upsert(&item.clone().at_revision(2)).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));

        let query = HashingEmbedder::new(64).embed("traits").await.unwrap();
        assert!(index.search(&query, 5, &Scope::Global).is_empty());
    }

    #[tokio::test]
    async fn test_batch_and_delete() {
        let (sync, _) = setup();
        let items: Vec<_> = (1..=4)
            .map(|i| ContentItem::post(i, format!("Post {}", i), "Ownership and moves"))
            .collect();

        let outcomes = sync.on_upsert_batch(&items).await.unwrap();
        assert!(outcomes.iter().all(|o| *o == UpsertOutcome::Inserted));
        assert_eq!(sync.index().len(), 4);

        assert!(sync.on_delete(ContentId(2)));
        assert!(!sync.on_delete(ContentId(2)));
        assert_eq!(sync.index().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_during_create_wins() {
        let index = Arc::new(ContentIndex::new(64));
        let sync = slow_sync(index.clone());
        let item = ContentItem::post(1, "Pinning", "Pin keeps futures in place");

        let pending = {
            let sync = sync.clone();
            let item = item.clone();
            tokio::spawn(async move { sync.on_upsert(&item).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!sync.on_delete(item.id));

        assert_eq!(pending.await.unwrap().unwrap(), UpsertOutcome::Stale);
        assert!(!index.contains(item.id));
        let query = HashingEmbedder::new(64).embed("pinning futures").await.unwrap();
        assert!(index.search(&query, 5, &Scope::Global).is_empty());
    }

    #[tokio::test]
    async fn test_delete_during_update_wins() {
        let index = Arc::new(ContentIndex::new(64));
        let sync = slow_sync(index.clone());
        let item = ContentItem::post(1, "Pinning", "Pin keeps futures in place");
        sync.on_upsert(&item).await.unwrap();

        let pending = {
            let sync = sync.clone();
            let edited = item.clone().at_revision(2);
            tokio::spawn(async move { sync.on_upsert(&edited).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(sync.on_delete(item.id));

        assert_eq!(pending.await.unwrap().unwrap(), UpsertOutcome::Stale);
        assert!(!index.contains(item.id));
        assert_eq!(index.current_revision(item.id), None);
    }

    #[tokio::test]
    async fn test_upsert_after_delete_skips_embedding() {
        let (sync, embedder) = setup();
        let item = ContentItem::post(1, "Lifetimes", "Lifetimes annotate references");
        sync.on_upsert(&item).await.unwrap();
        sync.on_delete(item.id);

        let outcome = sync.on_upsert(&item.at_revision(2)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Stale);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
