//! Completion providers
//!
//! - `OpenRouterCompletion`: OpenAI-compatible chat completions
//! - `ExtractiveCompletion`: offline fallback quoting the citations

pub mod extractive;
pub mod openrouter;
pub mod prompt;

pub use extractive::ExtractiveCompletion;
pub use openrouter::OpenRouterCompletion;
pub use prompt::{PromptTemplate, GROUNDING_TEMPLATE};
