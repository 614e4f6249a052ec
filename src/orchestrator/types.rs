//! Request and response types for the orchestrator

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Citation, Scope, Source};
use crate::error::ErrorEnvelope;
use crate::ratelimit::RateLimitStatus;
use crate::retrieval::GroundingContext;

/// Orchestration stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request accepted and validated
    Received,
    /// Quota consumed
    RateChecked,
    /// Fresh cached answer found
    CacheHit,
    /// No fresh cached answer
    CacheMiss,
    /// Retrieving citations
    Retrieving,
    /// Waiting on the completion provider
    Generating,
    /// Writing the answer through to the cache
    Caching,
    /// Answer assembled
    Done,
    /// Stopped with an error
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::RateChecked => "rate_checked",
            Stage::CacheHit => "cache_hit",
            Stage::CacheMiss => "cache_miss",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
            Stage::Caching => "caching",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A companion question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRequest {
    /// Free-text question
    pub query: String,
    /// Where to look
    #[serde(default)]
    pub scope: Scope,
    /// Caller identity, used for rate limiting
    pub caller_id: String,
    /// Citation count; the configured default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl CompanionRequest {
    /// Create a global-scope request
    pub fn new(query: impl Into<String>, caller_id: impl Into<String>) -> Self {
        CompanionRequest {
            query: query.into(),
            scope: Scope::Global,
            caller_id: caller_id.into(),
            k: None,
        }
    }

    /// Restrict to `scope`
    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Ask for `k` citations
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// A grounded answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionResponse {
    /// Correlates logs with the response
    pub request_id: Uuid,
    /// Generated answer
    pub text: String,
    /// Citations, best first
    pub citations: Vec<Citation>,
    /// One source per citation, same order
    pub sources: Vec<Source>,
    /// Whether the answer came from the response cache
    pub cached: bool,
    /// Quota after this request
    pub quota: RateLimitStatus,
    /// Stages the request went through
    pub stages: Vec<Stage>,
}

/// Retrieval-only result for moderation and detection grounding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    /// Correlates logs with the response
    pub request_id: Uuid,
    /// Formatted excerpts and their citations
    pub context: GroundingContext,
    /// One source per citation, same order
    pub sources: Vec<Source>,
    /// Quota after this request
    pub quota: RateLimitStatus,
}

/// Caller-facing outcome with quota metadata attached either way
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<T = CompanionResponse> {
    /// Answer or error
    #[serde(flatten)]
    pub body: ReplyBody<T>,
    /// Quota for the caller's category after this request
    pub quota: RateLimitStatus,
}

/// Answer or error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyBody<T = CompanionResponse> {
    /// Answered
    Ok {
        /// The answer
        response: T,
    },
    /// Failed
    Error {
        /// What went wrong, safe to show
        error: ErrorEnvelope,
    },
}

impl<T> Reply<T> {
    /// Whether the request was answered
    pub fn is_ok(&self) -> bool {
        matches!(self.body, ReplyBody::Ok { .. })
    }
}
