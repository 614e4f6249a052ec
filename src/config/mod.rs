//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Root `Config` and logging settings
//! - types/engine.rs: Index, retrieval, cache and rate limit settings
//! - types/provider.rs: Embedding and completion provider settings
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, LogConfig, LogFormat};

// Re-export engine types
pub use types::engine::{
    CacheConfig, CacheScope, CategoryLimits, IndexConfig, RateLimitConfig, RetrievalConfig,
};

// Re-export provider types
pub use types::provider::{CompletionConfig, EmbeddingBackend, EmbeddingConfig};

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
