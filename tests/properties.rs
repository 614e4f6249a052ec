//! Index and rate limiter properties under many inputs and concurrent callers

use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use threadwise::config::{CategoryLimits, RateLimitConfig};
use threadwise::core::{ContentId, ContentItem, IndexMetadata, Scope};
use threadwise::error::Error;
use threadwise::index::{ContentIndex, UpsertOutcome};
use threadwise::ratelimit::{Category, Clock, ManualClock, RateLimiter};

const DIMS: usize = 8;

/// Deterministic spread of vectors without pulling in an RNG
fn vector(seed: u64) -> Vec<f32> {
    (0..DIMS as u64)
        .map(|i| (((seed * 31 + i * 17) % 23) as f32 - 11.0) / 11.0)
        .collect()
}

fn metadata(id: u64) -> IndexMetadata {
    IndexMetadata::from(&ContentItem::post(id, format!("Post {}", id), "body"))
}

#[test]
fn search_is_bounded_sorted_and_unique() {
    let index = ContentIndex::new(DIMS);
    for id in 0..200u64 {
        index.upsert(ContentId(id), vector(id), metadata(id), 1);
    }

    for k in [0usize, 1, 5, 50, 200, 500] {
        for seed in [3u64, 99, 1234] {
            let hits = index.search(&vector(seed), k, &Scope::Global);
            assert!(hits.len() <= k);
            assert!(hits
                .windows(2)
                .all(|pair| pair[0].similarity >= pair[1].similarity));

            let ids: HashSet<ContentId> = hits.iter().map(|h| h.id).collect();
            assert_eq!(ids.len(), hits.len());
        }
    }
}

#[test]
fn reapplying_same_revision_changes_nothing() {
    let index = ContentIndex::new(DIMS);
    for id in 0..20u64 {
        index.upsert(ContentId(id), vector(id), metadata(id), 1);
    }
    let query = vector(7);
    let before: Vec<(ContentId, f32)> = index
        .search(&query, 10, &Scope::Global)
        .iter()
        .map(|h| (h.id, h.similarity))
        .collect();

    let outcome = index.upsert(ContentId(3), vector(500), metadata(3), 1);
    assert_eq!(outcome, UpsertOutcome::Unchanged);

    let after: Vec<(ContentId, f32)> = index
        .search(&query, 10, &Scope::Global)
        .iter()
        .map(|h| (h.id, h.similarity))
        .collect();
    assert_eq!(before, after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_are_all_searchable() {
    const N: u64 = 64;
    let index = Arc::new(ContentIndex::new(DIMS));

    let tasks: Vec<_> = (0..N)
        .map(|id| {
            let index = index.clone();
            tokio::spawn(async move { index.upsert(ContentId(id), vector(id), metadata(id), 1) })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), UpsertOutcome::Inserted);
    }

    let hits = index.search(&vector(1), N as usize, &Scope::Global);
    let ids: HashSet<ContentId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(hits.len(), N as usize);
    assert_eq!(ids, (0..N).map(ContentId).collect::<HashSet<_>>());
}

#[test]
fn limiter_admits_exactly_limit_per_window() {
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
    let limiter = RateLimiter::with_clock(
        &RateLimitConfig {
            window: Duration::from_secs(60),
            limits: CategoryLimits::uniform(5),
        },
        clock.clone(),
    );

    for round in 0..3 {
        for _ in 0..5 {
            limiter.check("carol", Category::Detection).unwrap();
        }
        match limiter.check("carol", Category::Detection) {
            Err(Error::Throttled { reset_at, .. }) => assert!(reset_at > clock.now()),
            other => panic!("round {}: expected throttle, got {:?}", round, other),
        }
        clock.advance(Duration::from_secs(60));
    }
}

