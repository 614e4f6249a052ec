//! Engine configuration types
//!
//! Sizing and policy knobs for the index, retrieval, cache and limiter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ratelimit::Category;

/// Content index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimension
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            dimensions: default_dimensions(),
        }
    }
}

fn default_dimensions() -> usize {
    256
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Citations returned when the caller does not ask for a count
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Largest citation count a caller may ask for
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Candidates fetched per requested citation, so per-thread capping
    /// still has enough material to fill `k`
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Most citations taken from a single thread
    #[serde(default = "default_max_per_parent")]
    pub max_per_parent: usize,
    /// Excerpt length in characters
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Longest accepted query, after normalization
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// Longest grounding context handed to the completion provider
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Hits at or below this similarity are dropped
    #[serde(default)]
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            default_k: default_k(),
            max_k: default_max_k(),
            candidate_multiplier: default_candidate_multiplier(),
            max_per_parent: default_max_per_parent(),
            excerpt_chars: default_excerpt_chars(),
            max_query_chars: default_max_query_chars(),
            max_context_chars: default_max_context_chars(),
            min_similarity: 0.0,
        }
    }
}

fn default_k() -> usize {
    5
}

fn default_max_k() -> usize {
    20
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_max_per_parent() -> usize {
    2
}

fn default_excerpt_chars() -> usize {
    200
}

fn default_max_query_chars() -> usize {
    2000
}

fn default_max_context_chars() -> usize {
    4000
}

/// Whether cached answers are shared between callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// One entry per (query, scope, k), shared by every caller
    #[default]
    Global,
    /// Entries additionally keyed by caller id
    PerCaller,
}

impl std::str::FromStr for CacheScope {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "global" => Ok(CacheScope::Global),
            "per_caller" | "caller" => Ok(CacheScope::PerCaller),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid cache scope: {}. Valid options: global, per_caller",
                s
            ))),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached answers
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
    /// Default time-to-live
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,
    /// Sharing policy
    #[serde(default)]
    pub scope: CacheScope,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: default_cache_capacity(),
            ttl: default_cache_ttl(),
            scope: CacheScope::default(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fixed window length
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    /// Requests allowed per window, per category
    #[serde(default)]
    pub limits: CategoryLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            window: default_window(),
            limits: CategoryLimits::default(),
        }
    }
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

/// Per-category request limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    /// AI companion questions
    #[serde(default = "default_companion_limit")]
    pub companion_query: u32,
    /// Moderation grounding
    #[serde(default = "default_moderation_limit")]
    pub moderation: u32,
    /// AI-content detection grounding
    #[serde(default = "default_detection_limit")]
    pub detection: u32,
    /// Plain search
    #[serde(default = "default_search_limit")]
    pub generic_search: u32,
}

impl CategoryLimits {
    /// Limit for `category`
    pub fn limit(&self, category: Category) -> u32 {
        match category {
            Category::CompanionQuery => self.companion_query,
            Category::Moderation => self.moderation,
            Category::Detection => self.detection,
            Category::GenericSearch => self.generic_search,
        }
    }

    /// Same limit for every category
    pub fn uniform(limit: u32) -> Self {
        CategoryLimits {
            companion_query: limit,
            moderation: limit,
            detection: limit,
            generic_search: limit,
        }
    }
}

impl Default for CategoryLimits {
    fn default() -> Self {
        CategoryLimits {
            companion_query: default_companion_limit(),
            moderation: default_moderation_limit(),
            detection: default_detection_limit(),
            generic_search: default_search_limit(),
        }
    }
}

fn default_companion_limit() -> u32 {
    20
}

fn default_moderation_limit() -> u32 {
    30
}

fn default_detection_limit() -> u32 {
    30
}

fn default_search_limit() -> u32 {
    60
}
