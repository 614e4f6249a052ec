//! Grounding context handed to the completion provider

use serde::{Deserialize, Serialize};

use crate::core::{Citation, ContentKind};

/// A sentence end this close to the cut point ends the context
const SENTENCE_SLACK: usize = 100;

/// Retrieved excerpts formatted for the completion step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingContext {
    /// Normalized query the context was built for
    pub query: String,
    /// Numbered, formatted excerpts
    pub text: String,
    /// Citations the text was built from, in rank order
    pub citations: Vec<Citation>,
}

impl GroundingContext {
    /// Format `citations` as numbered sources, bounded to `max_chars`
    pub fn build(query: &str, citations: &[Citation], max_chars: usize) -> Self {
        let mut parts = vec![format!("User Query: {}\n", query)];

        for (i, citation) in citations.iter().enumerate() {
            let heading = match (citation.kind, citation.parent_id) {
                (ContentKind::Post, _) => format!("Post: {}", citation.title),
                (ContentKind::Comment, Some(parent)) => format!("Comment on post {}", parent),
                (ContentKind::Comment, None) => "Comment".to_string(),
            };
            parts.push(format!(
                "[Source {}] {}\nAuthor: {}\nContent: {}\n",
                i + 1,
                heading,
                citation.author.as_deref().unwrap_or("Unknown"),
                citation.excerpt
            ));
        }

        GroundingContext {
            query: query.to_string(),
            text: truncate_context(&parts.join("\n"), max_chars),
            citations: citations.to_vec(),
        }
    }

    /// Whether there is nothing to ground on
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Number of sources
    pub fn source_count(&self) -> usize {
        self.citations.len()
    }
}

fn truncate_context(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let truncated = &chars[..max_chars];
    match truncated.iter().rposition(|&c| c == '.') {
        Some(p) if p + SENTENCE_SLACK > max_chars => truncated[..=p].iter().collect(),
        _ => format!("{}...", truncated.iter().collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{source_url, ContentId};
    use chrono::Utc;

    fn citation(id: u64, kind: ContentKind, parent: Option<u64>, excerpt: &str) -> Citation {
        let content_id = ContentId(id);
        let parent_id = parent.map(ContentId);
        Citation {
            content_id,
            kind,
            title: if kind == ContentKind::Post { "Borrowing".into() } else { "Comment".into() },
            excerpt: excerpt.to_string(),
            relevance_score: 0.9,
            source_url: source_url(content_id, kind, parent_id),
            parent_id,
            author: Some("ferris".into()),
            created_at: Utc::now(),
            revision: 1,
        }
    }

    #[test]
    fn test_numbered_sources() {
        let citations = vec![
            citation(1, ContentKind::Post, None, "The borrow checker enforces aliasing rules."),
            citation(2, ContentKind::Comment, Some(1), "Think of it as a reader-writer lock."),
        ];
        let ctx = GroundingContext::build("borrow checker", &citations, 4000);

        assert!(ctx.text.starts_with("User Query: borrow checker"));
        assert!(ctx.text.contains("[Source 1] Post: Borrowing"));
        assert!(ctx.text.contains("[Source 2] Comment on post 1"));
        assert!(ctx.text.contains("Author: ferris"));
        assert_eq!(ctx.source_count(), 2);
    }

    #[test]
    fn test_truncates_at_sentence_end() {
        let long = "Sentence one is here. ".repeat(50);
        let citations = vec![citation(1, ContentKind::Post, None, &long)];
        let ctx = GroundingContext::build("q", &citations, 300);

        assert!(ctx.text.chars().count() <= 300);
        assert!(ctx.text.ends_with('.'));
    }

    #[test]
    fn test_empty_context() {
        let ctx = GroundingContext::build("rust ownership", &[], 4000);
        assert!(ctx.is_empty());
        assert_eq!(ctx.text, "User Query: rust ownership\n");
    }
}
