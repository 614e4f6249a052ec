//! # Threadwise
//!
//! Retrieval-and-citation engine for community discussion companions.
//!
//! ## Features
//!
//! - **Semantic Index:** In-memory cosine search over posts and comments, kept
//!   in step with the content store through revision-aware sync
//! - **Grounded Answers:** Every answer cites the discussions it was built from
//! - **Revision-Aware Cache:** Cached answers are never served past an edit or
//!   deletion of a cited item
//! - **Per-Caller Limits:** Fixed-window quotas per request category

pub mod app;
pub mod cache;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod provider;
pub mod ratelimit;
pub mod retrieval;

pub use app::AppServices;
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{CompanionRequest, CompanionResponse, Orchestrator, Reply};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
