//! Per-caller, per-category fixed-window rate limiting
//!
//! Each `(caller, category)` key owns a counter for the current window.
//! Windows are aligned to multiples of the window length since the Unix
//! epoch, so every key resets at the same instants. State lives in a
//! sharded `DashMap`; the check-and-increment for one key runs under that
//! key's shard lock, which keeps it atomic under concurrent callers.

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{CategoryLimits, RateLimitConfig};
use crate::error::{Error, Result};

/// Request category; each has its own limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// AI companion questions
    CompanionQuery,
    /// Moderation grounding
    Moderation,
    /// AI-content detection grounding
    Detection,
    /// Plain search
    GenericSearch,
}

impl Category {
    /// Every category
    pub const ALL: [Category; 4] = [
        Category::CompanionQuery,
        Category::Moderation,
        Category::Detection,
        Category::GenericSearch,
    ];

    /// Stable snake-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CompanionQuery => "companion_query",
            Category::Moderation => "moderation",
            Category::Detection => "detection",
            Category::GenericSearch => "generic_search",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown request category: {}", s)))
    }
}

/// Quota as seen by a caller after a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Category checked
    pub category: Category,
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// End of the current window
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    /// Window start, milliseconds since the epoch
    start_ms: i64,
    /// Accepted requests; never exceeds the limit
    count: u32,
}

/// Fixed-window rate limiter
pub struct RateLimiter {
    windows: DashMap<(String, Category), WindowState>,
    limits: CategoryLimits,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            windows: DashMap::new(),
            limits: config.limits,
            window_ms: window_millis(config.window),
            clock,
        }
    }

    /// Configured limit for `category`
    pub fn limit(&self, category: Category) -> u32 {
        self.limits.limit(category)
    }

    /// Admit or reject one request from `caller` in `category`.
    ///
    /// Admitted requests consume one unit of quota. Rejected requests do not,
    /// and report when the window resets.
    pub fn check(&self, caller: &str, category: Category) -> Result<RateLimitStatus> {
        let now_ms = self.clock.now().timestamp_millis();
        let start_ms = self.window_start(now_ms);
        let limit = self.limits.limit(category);
        let reset_at = self.reset_at(start_ms);

        let mut state = self
            .windows
            .entry((caller.to_string(), category))
            .or_insert(WindowState { start_ms, count: 0 });

        if state.start_ms != start_ms {
            state.start_ms = start_ms;
            state.count = 0;
        }

        if state.count >= limit {
            debug!(caller, %category, limit, "Request throttled");
            return Err(Error::Throttled {
                category,
                limit,
                reset_at,
            });
        }

        state.count += 1;
        Ok(RateLimitStatus {
            category,
            limit,
            remaining: limit - state.count,
            reset_at,
        })
    }

    /// Current quota without consuming any
    pub fn status(&self, caller: &str, category: Category) -> RateLimitStatus {
        let now_ms = self.clock.now().timestamp_millis();
        let start_ms = self.window_start(now_ms);
        let limit = self.limits.limit(category);

        let used = self
            .windows
            .get(&(caller.to_string(), category))
            .filter(|state| state.start_ms == start_ms)
            .map(|state| state.count)
            .unwrap_or(0);

        RateLimitStatus {
            category,
            limit,
            remaining: limit.saturating_sub(used),
            reset_at: self.reset_at(start_ms),
        }
    }

    /// Drop keys whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let start_ms = self.window_start(self.clock.now().timestamp_millis());
        let before = self.windows.len();
        self.windows.retain(|_, state| state.start_ms >= start_ms);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Purged expired rate limit windows");
        }
        removed
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn window_start(&self, now_ms: i64) -> i64 {
        now_ms - now_ms.rem_euclid(self.window_ms)
    }

    fn reset_at(&self, start_ms: i64) -> DateTime<Utc> {
        let end_ms = start_ms.saturating_add(self.window_ms);
        DateTime::from_timestamp_millis(end_ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let config = RateLimitConfig {
            window: Duration::from_secs(window_secs),
            limits: CategoryLimits::uniform(limit),
        };
        (RateLimiter::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn test_exactly_limit_requests_succeed() {
        let (limiter, _) = limiter(3, 60);

        for expected_remaining in [2, 1, 0] {
            let status = limiter.check("alice", Category::CompanionQuery).unwrap();
            assert_eq!(status.remaining, expected_remaining);
        }

        match limiter.check("alice", Category::CompanionQuery) {
            Err(Error::Throttled { limit, reset_at, .. }) => {
                assert_eq!(limit, 3);
                assert_eq!(reset_at, DateTime::from_timestamp(1_700_000_040, 0).unwrap());
            }
            other => panic!("expected throttled, got {:?}", other),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter(1, 60);

        assert!(limiter.check("alice", Category::CompanionQuery).is_ok());
        assert!(limiter.check("alice", Category::CompanionQuery).is_err());
        assert!(limiter.check("alice", Category::Moderation).is_ok());
        assert!(limiter.check("bob", Category::CompanionQuery).is_ok());
    }

    #[test]
    fn test_window_rollover_resets_quota() {
        let (limiter, clock) = limiter(2, 60);

        limiter.check("alice", Category::Detection).unwrap();
        limiter.check("alice", Category::Detection).unwrap();
        assert!(limiter.check("alice", Category::Detection).is_err());

        // 1_700_000_000 is 20s into its window
        clock.advance(Duration::from_secs(40));
        let status = limiter.check("alice", Category::Detection).unwrap();
        assert_eq!(status.remaining, 1);
    }

    #[test]
    fn test_rejections_do_not_consume_quota() {
        let (limiter, clock) = limiter(1, 60);

        limiter.check("alice", Category::GenericSearch).unwrap();
        for _ in 0..5 {
            assert!(limiter.check("alice", Category::GenericSearch).is_err());
        }
        assert_eq!(limiter.status("alice", Category::GenericSearch).remaining, 0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.status("alice", Category::GenericSearch).remaining, 1);
    }

    #[test]
    fn test_zero_limit_rejects_everything() {
        let (limiter, _) = limiter(0, 60);
        assert!(matches!(
            limiter.check("alice", Category::Moderation),
            Err(Error::Throttled { limit: 0, .. })
        ));
    }

    #[test]
    fn test_purge_expired() {
        let (limiter, clock) = limiter(5, 60);
        limiter.check("alice", Category::CompanionQuery).unwrap();
        limiter.check("bob", Category::CompanionQuery).unwrap();
        assert_eq!(limiter.purge_expired(), 0);

        clock.advance(Duration::from_secs(60));
        limiter.check("bob", Category::CompanionQuery).unwrap();
        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_limit() {
        let (limiter, _) = limiter(25, 60);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check("shared", Category::CompanionQuery).is_ok())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("companion-query".parse::<Category>().unwrap(), Category::CompanionQuery);
        assert_eq!("detection".parse::<Category>().unwrap(), Category::Detection);
        assert!("search".parse::<Category>().is_err());
    }
}
