//! Query processing
//!
//! Normalizes free text and pulls out the keywords, intent and context
//! hints used for excerpt selection and logging.

use serde::{Deserialize, Serialize};

use crate::embedding::hashing::STOP_WORDS;

const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "should", "would",
];
const SEARCH_WORDS: &[&str] = &["find", "search", "look", "show", "get", "need", "want"];
const HELP_WORDS: &[&str] = &["help", "assist", "support", "guide", "explain", "tell"];

const TIME_WORDS: &[&str] = &[
    "recent", "latest", "new", "today", "yesterday", "old", "previous", "past", "earlier",
    "before",
];
const TIME_PHRASES: &[&str] = &["this week", "this month"];
const POST_WORDS: &[&str] = &["post", "posts", "submission", "submissions"];
const COMMENT_WORDS: &[&str] = &["comment", "comments", "reply", "replies"];
const USER_WORDS: &[&str] = &["user", "users", "author", "authors", "person", "people"];

/// What the caller is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// A direct question
    Question,
    /// Looking for content
    Search,
    /// Asking for guidance
    Help,
}

/// Extra signals found in the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    /// Mentions recency or a time frame
    TimeSensitive,
    /// Refers to posts
    Posts,
    /// Refers to comments
    Comments,
    /// Refers to people
    Users,
}

/// A validated, normalized query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedQuery {
    /// Query as received
    pub original: String,
    /// Trimmed, whitespace-collapsed, lowercased
    pub normalized: String,
    /// Content words longer than two characters
    pub keywords: Vec<String>,
    /// Detected intent
    pub intent: Intent,
    /// Detected hints
    pub hints: Vec<Hint>,
}

impl ProcessedQuery {
    /// Process `query`. Does not validate; see `RetrievalEngine::prepare`.
    pub fn new(query: &str) -> Self {
        let normalized = normalize_query(query);
        let words = words(&normalized);

        let keywords = words
            .iter()
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
            .map(|w| w.to_string())
            .collect();

        ProcessedQuery {
            original: query.to_string(),
            intent: detect_intent(&normalized, &words),
            hints: detect_hints(&normalized, &words),
            keywords,
            normalized,
        }
    }

    /// Whether the normalized query is empty
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Trim, collapse whitespace runs to a single space, lowercase
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

fn detect_intent(normalized: &str, words: &[&str]) -> Intent {
    let any = |list: &[&str]| words.iter().any(|w| list.contains(w));

    if normalized.contains('?') || any(QUESTION_WORDS) {
        Intent::Question
    } else if any(SEARCH_WORDS) {
        Intent::Search
    } else if any(HELP_WORDS) {
        Intent::Help
    } else {
        Intent::Search
    }
}

fn detect_hints(normalized: &str, words: &[&str]) -> Vec<Hint> {
    let any = |list: &[&str]| words.iter().any(|w| list.contains(w));
    let mut hints = Vec::new();

    if any(TIME_WORDS) || TIME_PHRASES.iter().any(|p| normalized.contains(p)) {
        hints.push(Hint::TimeSensitive);
    }
    if any(POST_WORDS) {
        hints.push(Hint::Posts);
    }
    if any(COMMENT_WORDS) {
        hints.push(Hint::Comments);
    }
    if any(USER_WORDS) {
        hints.push(Hint::Users);
    }

    hints
}
