//! Error types for Threadwise

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::Category;

/// Result type alias using Threadwise's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to callers when an upstream provider fails
pub const PROVIDER_RETRY_MESSAGE: &str =
    "The assistant is temporarily unavailable, please retry shortly.";

/// How an upstream provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailure {
    /// The call did not finish in time
    Timeout,
    /// The provider refused the call because a quota was exhausted
    QuotaExceeded,
    /// The provider rejected the prompt or output on policy grounds
    ContentPolicy,
    /// Any other upstream failure (5xx, malformed body, transport error)
    Upstream,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFailure::Timeout => write!(f, "timeout"),
            ProviderFailure::QuotaExceeded => write!(f, "quota exceeded"),
            ProviderFailure::ContentPolicy => write!(f, "content policy rejection"),
            ProviderFailure::Upstream => write!(f, "upstream failure"),
        }
    }
}

/// Main error type for Threadwise
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or malformed request
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Embedding or completion provider failure
    #[error("Provider error ({provider}, {kind}): {detail}")]
    Provider {
        /// Which provider failed
        provider: String,
        /// Failure class
        kind: ProviderFailure,
        /// Upstream detail, for logs only
        detail: String,
    },

    /// Rate limit exceeded for a (caller, category) pair
    #[error("Rate limit exceeded for {category}: {limit} requests per window, resets at {reset_at}")]
    Throttled {
        /// Throttled category
        category: Category,
        /// Configured limit for the window
        limit: u32,
        /// When the current window ends
        reset_at: DateTime<Utc>,
    },

    /// Scope references content that no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller went away before the answer was ready
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a provider error
    pub fn provider(
        provider: impl Into<String>,
        kind: ProviderFailure,
        detail: impl Into<String>,
    ) -> Self {
        Error::Provider {
            provider: provider.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider { kind, .. } => !matches!(kind, ProviderFailure::ContentPolicy),
            Error::Http(_) => true,
            _ => false,
        }
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound(_) | Error::Throttled { .. }
        )
    }

    /// Stable machine-readable code for the caller-facing envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Provider { .. } | Error::Http(_) => "provider_error",
            Error::Throttled { .. } => "throttled",
            Error::NotFound(_) => "not_found",
            Error::Cancelled => "cancelled",
            Error::Config(_) | Error::Json(_) | Error::Io(_) | Error::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Caller-facing envelope. Provider and internal details stay in the logs.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (message, reset_at) = match self {
            Error::Validation(msg) => (msg.clone(), None),
            Error::NotFound(msg) => (msg.clone(), None),
            Error::Provider { .. } | Error::Http(_) => (PROVIDER_RETRY_MESSAGE.to_string(), None),
            Error::Throttled { reset_at, .. } => (
                format!("Too many requests, try again after {}", reset_at.to_rfc3339()),
                Some(*reset_at),
            ),
            Error::Cancelled => ("Request cancelled".to_string(), None),
            Error::Config(_) | Error::Json(_) | Error::Io(_) | Error::Internal(_) => {
                ("Something went wrong on our side".to_string(), None)
            }
        };

        ErrorEnvelope {
            code: self.code().to_string(),
            message,
            reset_at,
        }
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// When a throttled caller may retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}
