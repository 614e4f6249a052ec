//! Response cache - memoized (answer, citations) per query
//!
//! Backed by a moka async cache with LRU eviction and a per-entry TTL.
//! Freshness is checked lazily: on every read each cited content id's
//! recorded revision is compared with the index's current revision, and
//! any mismatch (or deleted content) evicts the entry and reports a miss.
//! Content mutations never touch the cache directly.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub use crate::config::CacheScope;
use crate::core::{Citation, Scope};
use crate::index::RevisionSource;

/// Stable cache key: hash of (normalized query, scope, k, caller)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key. `caller` is only set under [`CacheScope::PerCaller`].
    pub fn new(normalized_query: &str, scope: &Scope, k: usize, caller: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_query.as_bytes());
        hasher.update([0u8]);
        hasher.update(scope.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(k.to_le_bytes());
        if let Some(caller) = caller {
            hasher.update([1u8]);
            hasher.update(caller.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A memoized answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    /// Generated text
    pub answer: String,
    /// Citations the answer was grounded on
    pub citations: Vec<Citation>,
}

#[derive(Debug)]
struct CacheEntry {
    answer: CachedAnswer,
    ttl: Duration,
    created_at: DateTime<Utc>,
}

struct EntryExpiry;

impl Expiry<CacheKey, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Counters for cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Fresh hits
    pub hits: u64,
    /// Absent, expired or stale lookups
    pub misses: u64,
    /// Entries dropped because cited content changed
    pub invalidations: u64,
    /// Approximate live entries
    pub entries: u64,
}

/// Memoizes end-to-end answers
pub struct ResponseCache {
    entries: Cache<CacheKey, Arc<CacheEntry>>,
    default_ttl: Duration,
    revisions: Arc<dyn RevisionSource>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` answers
    pub fn new(capacity: u64, default_ttl: Duration, revisions: Arc<dyn RevisionSource>) -> Self {
        ResponseCache {
            entries: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .expire_after(EntryExpiry)
                .build(),
            default_ttl,
            revisions,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Look up a fresh answer. Stale entries are evicted and reported as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedAnswer> {
        let Some(entry) = self.entries.get(key).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if !self.is_fresh(&entry.answer) {
            debug!(
                "Cached answer {} (written {}) cites changed content; evicting",
                key, entry.created_at
            );
            if self.evict_if_unchanged(key, &entry).await {
                self.invalidations.fetch_add(1, Ordering::Relaxed);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.answer.clone())
    }

    /// Store `answer` for `ttl`, or the default TTL when `None`
    pub async fn put(&self, key: CacheKey, answer: CachedAnswer, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return;
        }

        let entry = CacheEntry {
            answer,
            ttl,
            created_at: Utc::now(),
        };
        self.entries.insert(key, Arc::new(entry)).await;
    }

    /// Drop one entry
    pub async fn invalidate(&self, key: &CacheKey) {
        self.entries.invalidate(key).await;
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Whether `key` is present, regardless of freshness
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Apply pending evictions and expirations
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }

    /// Remove `key` only while it still maps to `seen`, so an answer written
    /// by a concurrent request after the staleness check survives
    async fn evict_if_unchanged(&self, key: &CacheKey, seen: &Arc<CacheEntry>) -> bool {
        let result = self
            .entries
            .entry(key.clone())
            .and_compute_with(|current| {
                let op = match current {
                    Some(current) if Arc::ptr_eq(current.value(), seen) => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        matches!(result, CompResult::Removed(_))
    }

    fn is_fresh(&self, answer: &CachedAnswer) -> bool {
        answer.citations.iter().all(|citation| {
            self.revisions.current_revision(citation.content_id) == Some(citation.revision)
        })
    }
}
