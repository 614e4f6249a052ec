//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::provider::EmbeddingBackend;
use super::types::Config;
use crate::ratelimit::Category;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

impl std::fmt::Display for ConfigValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return write!(f, "Configuration is valid");
        }

        for issue in &self.errors {
            writeln!(f, "error: {}", issue)?;
        }
        for issue in &self.warnings {
            writeln!(f, "warning: {}", issue)?;
        }
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_index_config(config, result);
    result = validate_retrieval_config(config, result);
    result = validate_cache_config(config, result);
    result = validate_rate_limit_config(config, result);
    result = validate_provider_config(config, result);

    result
}

fn validate_index_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.index.dimensions == 0 {
        result = result.with_error(
            ValidationIssue::new("index.dimensions", "Embedding dimension must be positive")
                .with_suggestion("Match the dimension of the configured embedding model"),
        );
    }

    result
}

fn validate_retrieval_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let retrieval = &config.retrieval;

    if retrieval.max_k == 0 {
        result = result.with_error(ValidationIssue::new(
            "retrieval.max_k",
            "At least one citation must be allowed",
        ));
    }

    if retrieval.default_k == 0 || retrieval.default_k > retrieval.max_k {
        result = result.with_error(
            ValidationIssue::new(
                "retrieval.default_k",
                format!(
                    "default_k ({}) must be between 1 and max_k ({})",
                    retrieval.default_k, retrieval.max_k
                ),
            )
            .with_suggestion("Lower default_k or raise max_k"),
        );
    }

    if retrieval.candidate_multiplier == 0 || retrieval.max_per_parent == 0 {
        result = result.with_error(ValidationIssue::new(
            "retrieval",
            "candidate_multiplier and max_per_parent must be positive",
        ));
    }

    if !(-1.0..1.0).contains(&retrieval.min_similarity) {
        result = result.with_warning(
            ValidationIssue::new(
                "retrieval.min_similarity",
                format!(
                    "min_similarity {} filters out every hit",
                    retrieval.min_similarity
                ),
            )
            .with_suggestion("Use a value in [-1, 1)"),
        );
    }

    result
}

fn validate_cache_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.cache.capacity == 0 {
        result = result.with_error(
            ValidationIssue::new("cache.capacity", "Response cache capacity must be positive"),
        );
    }

    if config.cache.ttl.is_zero() {
        result = result.with_warning(
            ValidationIssue::new("cache.ttl", "A zero TTL disables response caching")
                .with_suggestion("Set cache.ttl to a duration such as \"10m\""),
        );
    }

    result
}

fn validate_rate_limit_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.rate_limit.window.is_zero() {
        result = result.with_error(
            ValidationIssue::new("rate_limit.window", "Rate limit window must be positive")
                .with_suggestion("Set rate_limit.window to a duration such as \"1m\""),
        );
    }

    for category in Category::ALL {
        if config.rate_limit.limits.limit(category) == 0 {
            result = result.with_error(ValidationIssue::new(
                format!("rate_limit.limits.{}", category),
                "A zero limit rejects every request in this category",
            ));
        }
    }

    result
}

fn validate_provider_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.embedding.provider == EmbeddingBackend::Http && config.embedding.base_url.is_none() {
        result = result.with_error(
            ValidationIssue::new(
                "embedding.base_url",
                "HTTP embedding provider selected but no base URL configured",
            )
            .with_suggestion("Set THREADWISE_EMBEDDING_BASE_URL or configure embedding.base_url"),
        );
    }

    if let Some(base_url) = &config.embedding.base_url {
        result = check_url("embedding.base_url", base_url, result);
    }
    result = check_url("completion.base_url", &config.completion.base_url, result);

    #[cfg(not(feature = "local-embeddings"))]
    if config.embedding.provider == EmbeddingBackend::Local {
        result = result.with_error(
            ValidationIssue::new(
                "embedding.provider",
                "Local embeddings require the `local-embeddings` feature",
            )
            .with_suggestion("Rebuild with --features local-embeddings or use the hashing provider"),
        );
    }

    if config.completion.api_key.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "completion.api_key",
                "No completion API key configured. Answers will be extractive summaries of the citations.",
            )
            .with_suggestion("Set THREADWISE_COMPLETION_API_KEY environment variable"),
        );
    }

    result
}

fn check_url(path: &str, raw: &str, result: ConfigValidationResult) -> ConfigValidationResult {
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => result,
        Ok(url) => result.with_error(ValidationIssue::new(
            path,
            format!("Unsupported URL scheme '{}'", url.scheme()),
        )),
        Err(e) => result.with_error(
            ValidationIssue::new(path, format!("Invalid URL '{}': {}", raw, e))
                .with_suggestion("Use an absolute http(s) URL"),
        ),
    }
}
