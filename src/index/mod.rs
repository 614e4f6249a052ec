//! Content index - in-memory semantic index over community content
//!
//! Maps content id -> embedding + citation metadata behind a reader-biased
//! `parking_lot::RwLock`. Search is a brute-force cosine scan over every
//! entry that passes the scope filter, O(n·D) per query.
//!
//! The index never raises business errors: malformed upserts are reported
//! through [`UpsertOutcome`] and an empty index simply yields no hits.
//!
//! Deletes are final. The content store never reuses an id, so a removed id
//! is remembered and any upsert that was in flight when it was deleted is
//! dropped instead of bringing the entry back.

pub mod similarity;
pub mod sync;

pub use sync::ContentSync;

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{ContentId, IndexMetadata, Revision, Scope};
use similarity::{cosine_with_norms, l2_norm};

/// Reports the current revision of content, as known to the index.
///
/// The response cache consults this on every read to decide whether a
/// cached answer still reflects the content it cites.
pub trait RevisionSource: Send + Sync {
    /// Current revision of `id`, or `None` if the content no longer exists
    fn current_revision(&self, id: ContentId) -> Option<Revision>;
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New entry created
    Inserted,
    /// Existing entry replaced by a newer revision
    Replaced,
    /// Same revision already indexed; nothing changed
    Unchanged,
    /// Older than the indexed revision, or the content was deleted; ignored
    Stale,
    /// Wrong dimension or non-finite values; ignored
    Rejected,
}

/// A single ranked hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matched content
    pub id: ContentId,
    /// Cosine similarity to the query in [-1, 1]
    pub similarity: f32,
    /// Revision the embedding was computed from
    pub revision: Revision,
    /// Citation metadata
    pub metadata: Arc<IndexMetadata>,
}

struct IndexEntry {
    vector: Vec<f32>,
    norm: f32,
    revision: Revision,
    /// Latest revision announced by the content store. Ahead of `revision`
    /// while a new embedding is being computed.
    latest_revision: Revision,
    metadata: Arc<IndexMetadata>,
}

impl IndexEntry {
    fn is_stale(&self) -> bool {
        self.latest_revision > self.revision
    }
}

#[derive(Default)]
struct IndexState {
    entries: HashMap<ContentId, IndexEntry>,
    deleted: HashSet<ContentId>,
}

/// Queryable store of content embeddings
pub struct ContentIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl ContentIndex {
    /// Create an empty index for vectors of `dimensions` components
    pub fn new(dimensions: usize) -> Self {
        ContentIndex {
            dimensions,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Vector dimension accepted by this index
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Whether `id` is indexed
    pub fn contains(&self, id: ContentId) -> bool {
        self.state.read().entries.contains_key(&id)
    }

    /// Revision the stored embedding was computed from
    pub fn indexed_revision(&self, id: ContentId) -> Option<Revision> {
        self.state.read().entries.get(&id).map(|e| e.revision)
    }

    /// Metadata stored for `id`
    pub fn metadata(&self, id: ContentId) -> Option<Arc<IndexMetadata>> {
        self.state.read().entries.get(&id).map(|e| e.metadata.clone())
    }

    /// Insert or replace the embedding for `id`.
    ///
    /// Re-applying the indexed revision is a no-op and older revisions are
    /// ignored. Replacing an entry advances its revision, which makes every
    /// cached answer citing it stale on its next read.
    pub fn upsert(
        &self,
        id: ContentId,
        vector: Vec<f32>,
        metadata: IndexMetadata,
        revision: Revision,
    ) -> UpsertOutcome {
        if vector.len() != self.dimensions || vector.iter().any(|x| !x.is_finite()) {
            warn!(
                "Rejected embedding for content {}: expected {} finite components, got {}",
                id,
                self.dimensions,
                vector.len()
            );
            return UpsertOutcome::Rejected;
        }

        let norm = l2_norm(&vector);
        let mut state = self.state.write();
        if state.deleted.contains(&id) {
            debug!("Ignoring upsert for deleted content {} (rev {})", id, revision);
            return UpsertOutcome::Stale;
        }

        if let Some(existing) = state.entries.get_mut(&id) {
            if revision < existing.revision {
                debug!(
                    "Ignoring stale upsert for content {} (rev {} < {})",
                    id, revision, existing.revision
                );
                return UpsertOutcome::Stale;
            }
            if revision == existing.revision {
                return UpsertOutcome::Unchanged;
            }

            existing.vector = vector;
            existing.norm = norm;
            existing.revision = revision;
            existing.latest_revision = existing.latest_revision.max(revision);
            existing.metadata = Arc::new(metadata);
            return UpsertOutcome::Replaced;
        }

        state.entries.insert(
            id,
            IndexEntry {
                vector,
                norm,
                revision,
                latest_revision: revision,
                metadata: Arc::new(metadata),
            },
        );
        UpsertOutcome::Inserted
    }

    /// Record that the content store has moved `id` to `revision` before the
    /// new embedding is available.
    ///
    /// The entry is excluded from ranking until a matching upsert arrives,
    /// and cached answers citing it become stale immediately. Returns false
    /// if `id` is not indexed.
    pub fn mark_revision(&self, id: ContentId, revision: Revision) -> bool {
        let mut state = self.state.write();
        match state.entries.get_mut(&id) {
            Some(entry) => {
                entry.latest_revision = entry.latest_revision.max(revision);
                true
            }
            None => false,
        }
    }

    /// Delete the entry for `id`. Cached answers citing it miss on their next
    /// read, and later upserts for `id` are ignored. Returns whether an entry
    /// was present.
    pub fn remove(&self, id: ContentId) -> bool {
        let mut state = self.state.write();
        state.deleted.insert(id);
        state.entries.remove(&id).is_some()
    }

    /// Whether `id` has been deleted
    pub fn is_deleted(&self, id: ContentId) -> bool {
        self.state.read().deleted.contains(&id)
    }

    /// Rank entries inside `scope` by cosine similarity to `query`.
    ///
    /// Results are ordered by descending similarity, ties broken by most
    /// recent creation time and then by id; at most `k` hits are returned.
    /// Entries whose embedding lags behind the content revision are skipped.
    pub fn search(&self, query: &[f32], k: usize, scope: &Scope) -> Vec<SearchHit> {
        if k == 0 || query.len() != self.dimensions {
            return Vec::new();
        }

        let query_norm = l2_norm(query);
        let state = self.state.read();

        let mut hits: Vec<SearchHit> = state
            .entries
            .iter()
            .filter(|(id, entry)| !entry.is_stale() && scope.matches(**id, &entry.metadata))
            .map(|(id, entry)| SearchHit {
                id: *id,
                similarity: cosine_with_norms(query, query_norm, &entry.vector, entry.norm),
                revision: entry.revision,
                metadata: entry.metadata.clone(),
            })
            .collect();
        drop(state);

        if hits.len() > k {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);
        hits
    }
}

fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.metadata.created_at.cmp(&a.metadata.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl RevisionSource for ContentIndex {
    fn current_revision(&self, id: ContentId) -> Option<Revision> {
        self.state.read().entries.get(&id).map(|e| e.latest_revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContentItem;
    use chrono::{Duration, Utc};

    fn meta(id: u64) -> IndexMetadata {
        IndexMetadata::from(&ContentItem::post(id, format!("Post {}", id), "body"))
    }

    #[test]
    fn test_empty_index_search() {
        let index = ContentIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 5, &Scope::Global).is_empty());
    }

    #[test]
    fn test_search_orders_by_similarity_and_bounds_k() {
        let index = ContentIndex::new(2);
        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 1);
        index.upsert(ContentId(2), vec![0.7, 0.7], meta(2), 1);
        index.upsert(ContentId(3), vec![0.0, 1.0], meta(3), 1);

        let hits = index.search(&[1.0, 0.1], 2, &Scope::Global);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, ContentId(1));
        assert_eq!(hits[1].id, ContentId(2));
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn test_ties_prefer_recent_content() {
        let index = ContentIndex::new(2);
        let now = Utc::now();
        let old = IndexMetadata {
            created_at: now - Duration::days(3),
            ..meta(1)
        };
        let new = IndexMetadata {
            created_at: now,
            ..meta(2)
        };
        index.upsert(ContentId(1), vec![1.0, 0.0], old, 1);
        index.upsert(ContentId(2), vec![1.0, 0.0], new, 1);

        let hits = index.search(&[1.0, 0.0], 2, &Scope::Global);
        assert_eq!(hits[0].id, ContentId(2));
        assert_eq!(hits[1].id, ContentId(1));
    }

    #[test]
    fn test_scope_filter_applies_before_ranking() {
        let index = ContentIndex::new(2);
        let item_a = ContentItem::post(1, "a", "a").in_community(10);
        let item_b = ContentItem::post(2, "b", "b").in_community(20);
        index.upsert(item_a.id, vec![1.0, 0.0], IndexMetadata::from(&item_a), 1);
        index.upsert(item_b.id, vec![1.0, 0.0], IndexMetadata::from(&item_b), 1);

        let hits = index.search(&[1.0, 0.0], 5, &Scope::Community(20));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ContentId(2));
    }

    #[test]
    fn test_upsert_same_revision_is_idempotent() {
        let index = ContentIndex::new(2);
        assert_eq!(index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 3), UpsertOutcome::Inserted);
        let before: Vec<_> = index
            .search(&[1.0, 0.0], 5, &Scope::Global)
            .into_iter()
            .map(|h| (h.id, h.similarity))
            .collect();

        assert_eq!(
            index.upsert(ContentId(1), vec![0.0, 1.0], meta(1), 3),
            UpsertOutcome::Unchanged
        );
        let after: Vec<_> = index
            .search(&[1.0, 0.0], 5, &Scope::Global)
            .into_iter()
            .map(|h| (h.id, h.similarity))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_stale_and_rejected_upserts() {
        let index = ContentIndex::new(2);
        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 5);
        assert_eq!(index.upsert(ContentId(1), vec![0.0, 1.0], meta(1), 4), UpsertOutcome::Stale);
        assert_eq!(index.upsert(ContentId(2), vec![1.0], meta(2), 1), UpsertOutcome::Rejected);
        assert_eq!(
            index.upsert(ContentId(3), vec![f32::NAN, 0.0], meta(3), 1),
            UpsertOutcome::Rejected
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.upsert(ContentId(1), vec![0.0, 1.0], meta(1), 6), UpsertOutcome::Replaced);
        assert_eq!(index.indexed_revision(ContentId(1)), Some(6));
    }

    #[test]
    fn test_marked_revision_hides_entry_until_reembedded() {
        let index = ContentIndex::new(2);
        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 1);

        assert!(index.mark_revision(ContentId(1), 2));
        assert_eq!(index.current_revision(ContentId(1)), Some(2));
        assert!(index.search(&[1.0, 0.0], 5, &Scope::Global).is_empty());

        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 2);
        assert_eq!(index.search(&[1.0, 0.0], 5, &Scope::Global).len(), 1);
        assert!(!index.mark_revision(ContentId(99), 1));
    }

    #[test]
    fn test_remove() {
        let index = ContentIndex::new(2);
        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 1);
        assert!(index.remove(ContentId(1)));
        assert!(!index.remove(ContentId(1)));
        assert_eq!(index.current_revision(ContentId(1)), None);
        assert!(index.search(&[1.0, 0.0], 5, &Scope::Global).is_empty());
    }

    #[test]
    fn test_deleted_id_stays_deleted() {
        let index = ContentIndex::new(2);
        index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 1);
        index.remove(ContentId(1));
        assert!(index.is_deleted(ContentId(1)));

        assert_eq!(index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 1), UpsertOutcome::Stale);
        assert_eq!(index.upsert(ContentId(1), vec![1.0, 0.0], meta(1), 9), UpsertOutcome::Stale);
        assert!(!index.contains(ContentId(1)));

        // Never indexed, deleted before its create landed
        assert!(!index.remove(ContentId(2)));
        assert_eq!(index.upsert(ContentId(2), vec![0.0, 1.0], meta(2), 1), UpsertOutcome::Stale);
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_never_returns_duplicates() {
        let index = ContentIndex::new(3);
        for i in 0..50u64 {
            let v = vec![(i % 7) as f32 + 0.1, (i % 3) as f32, 1.0];
            index.upsert(ContentId(i), v, meta(i), 1);
        }

        for k in [0usize, 1, 5, 49, 50, 80] {
            let hits = index.search(&[1.0, 0.5, 0.2], k, &Scope::Global);
            assert!(hits.len() <= k);
            let mut ids: Vec<_> = hits.iter().map(|h| h.id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), hits.len());
            assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        }
    }
}
