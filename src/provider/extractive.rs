//! Offline completion provider
//!
//! Used when no completion API key is configured: the answer is assembled
//! from the cited excerpts themselves.

use async_trait::async_trait;

use crate::core::{CompletionProvider, GenerationOptions};
use crate::error::Result;
use crate::retrieval::GroundingContext;

/// Answers by quoting the grounding excerpts
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveCompletion;

#[async_trait]
impl CompletionProvider for ExtractiveCompletion {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn complete(
        &self,
        prompt: &str,
        grounding: &GroundingContext,
        _options: &GenerationOptions,
    ) -> Result<String> {
        let question = prompt.trim();
        if grounding.is_empty() {
            return Ok(format!(
                "I couldn't find any relevant discussions about \"{}\". \
                 Consider starting a new discussion to get input from the community.",
                question
            ));
        }

        let mut answer = format!(
            "Here is what the community has said about \"{}\":\n",
            question
        );
        for (i, citation) in grounding.citations.iter().enumerate() {
            answer.push_str(&format!(
                "\n[Source {}] {}: {}",
                i + 1,
                citation.title,
                citation.excerpt
            ));
        }
        Ok(answer)
    }
}
