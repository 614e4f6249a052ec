//! Prompt templates

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::retrieval::GroundingContext;

/// System prompt anchoring the answer in retrieved community content
pub const GROUNDING_TEMPLATE: &str = r#"You are an assistant for a community discussion platform. Answer the user's question using the community content below.
{{#if has_sources}}

Context from community posts and comments:
{{context}}

Instructions:
1. Answer from the provided context.
2. Cite sources inline as [Source N], where N is the source number.
3. If the context does not contain enough information, say so.
4. Be concise and conversational.

Available sources:
{{#each sources}}
[Source {{number}}] {{title}} (relevance {{relevance}}): {{url}}
{{/each}}
{{else}}

No community content matched this question. Say that no relevant discussions were found, give brief general guidance, and suggest starting a new discussion.
{{/if}}"#;

/// A prompt template using Handlebars syntax
pub struct PromptTemplate {
    /// Template name
    name: String,
    /// Handlebars registry
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();
        // Prompts are plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Internal(format!("Invalid template: {}", e)))?;

        Ok(PromptTemplate { name, registry })
    }

    /// The built-in grounding template
    pub fn grounding() -> Result<Self> {
        Self::new("grounding", GROUNDING_TEMPLATE)
    }

    /// Render the template with given data
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| Error::Internal(format!("Template render error: {}", e)))
    }

    /// Render the grounding system prompt for `grounding`
    pub fn render_grounding(&self, grounding: &GroundingContext) -> Result<String> {
        self.render(&GroundingData::from(grounding))
    }
}

#[derive(Serialize)]
struct GroundingData<'a> {
    has_sources: bool,
    context: &'a str,
    sources: Vec<SourceData<'a>>,
}

#[derive(Serialize)]
struct SourceData<'a> {
    number: usize,
    title: &'a str,
    relevance: String,
    url: &'a str,
}

impl<'a> From<&'a GroundingContext> for GroundingData<'a> {
    fn from(grounding: &'a GroundingContext) -> Self {
        GroundingData {
            has_sources: !grounding.is_empty(),
            context: &grounding.text,
            sources: grounding
                .citations
                .iter()
                .enumerate()
                .map(|(i, c)| SourceData {
                    number: i + 1,
                    title: &c.title,
                    relevance: format!("{:.3}", c.relevance_score),
                    url: &c.source_url,
                })
                .collect(),
        }
    }
}
