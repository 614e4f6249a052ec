//! Core module - Fundamental traits and types for Threadwise
//!
//! This module defines the abstractions the engine is built around:
//! - Content, scope and citation types shared by every component
//! - Provider traits for the embedding and completion backends

pub mod provider;
pub mod types;

// Re-export core traits for convenient access
pub use provider::{CompletionProvider, EmbeddingProvider, GenerationOptions};
pub use types::*;
