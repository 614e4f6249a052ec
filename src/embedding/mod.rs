//! Embedding module - providers that turn text into vectors
//!
//! - `HashingEmbedder`: deterministic, offline feature hashing
//! - `CachedEmbedder`: moka memo in front of any provider
//! - `HttpEmbeddingProvider`: OpenAI-compatible `/embeddings` endpoint
//! - `LocalEmbeddingProvider`: fastembed model (feature `local-embeddings`)

pub mod cached;
pub mod hashing;
pub mod http;
#[cfg(feature = "local-embeddings")]
pub mod local;

pub use cached::CachedEmbedder;
pub use hashing::HashingEmbedder;
pub use http::HttpEmbeddingProvider;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddingProvider;
