//! Core types used across the application
//!
//! Content records as supplied by the community content store, the scope
//! filter that restricts retrieval, and the citation objects handed back
//! to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Monotonically increasing revision stamp assigned by the content store
pub type Revision = u64;

/// Identifier of a post or comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ContentId {
    fn from(id: u64) -> Self {
        ContentId(id)
    }
}

/// Kind of community content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Top-level post in a community
    Post,
    /// Reply attached to a post
    Comment,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Post => write!(f, "post"),
            ContentKind::Comment => write!(f, "comment"),
        }
    }
}

/// A post or comment owned by the external content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Content identifier
    pub id: ContentId,
    /// Post or comment
    pub kind: ContentKind,
    /// Post title (comments have none)
    #[serde(default)]
    pub title: Option<String>,
    /// Body text
    pub text: String,
    /// Parent post for comments
    #[serde(default)]
    pub parent_id: Option<ContentId>,
    /// Community the content belongs to
    #[serde(default)]
    pub community_id: Option<u64>,
    /// Author display name
    #[serde(default)]
    pub author: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Current revision
    #[serde(default = "first_revision")]
    pub revision: Revision,
}

fn first_revision() -> Revision {
    1
}

impl ContentItem {
    /// Create a new post at revision 1
    pub fn post(id: impl Into<ContentId>, title: impl Into<String>, text: impl Into<String>) -> Self {
        ContentItem {
            id: id.into(),
            kind: ContentKind::Post,
            title: Some(title.into()),
            text: text.into(),
            parent_id: None,
            community_id: None,
            author: None,
            created_at: Utc::now(),
            revision: first_revision(),
        }
    }

    /// Create a new comment on `parent` at revision 1
    pub fn comment(
        id: impl Into<ContentId>,
        parent: impl Into<ContentId>,
        text: impl Into<String>,
    ) -> Self {
        ContentItem {
            id: id.into(),
            kind: ContentKind::Comment,
            title: None,
            text: text.into(),
            parent_id: Some(parent.into()),
            community_id: None,
            author: None,
            created_at: Utc::now(),
            revision: first_revision(),
        }
    }

    /// Set the community
    pub fn in_community(mut self, community_id: u64) -> Self {
        self.community_id = Some(community_id);
        self
    }

    /// Set the author
    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the creation time
    pub fn created(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the revision
    pub fn at_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    /// Text used to compute the embedding: title followed by body
    pub fn searchable_text(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => format!("{} {}", title, self.text),
            _ => self.text.clone(),
        }
    }
}

/// Denormalized metadata stored next to each embedding, enough to build a
/// citation without going back to the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Post or comment
    pub kind: ContentKind,
    /// Display title ("Comment" for comments)
    pub title: String,
    /// Body text, used for excerpts
    pub text: String,
    /// Parent post for comments
    pub parent_id: Option<ContentId>,
    /// Community the content belongs to
    pub community_id: Option<u64>,
    /// Author display name
    pub author: Option<String>,
    /// Creation time, used to break similarity ties
    pub created_at: DateTime<Utc>,
}

impl IndexMetadata {
    /// Thread the content belongs to: the parent post for comments, itself for posts
    pub fn thread_of(&self, id: ContentId) -> ContentId {
        self.parent_id.unwrap_or(id)
    }
}

impl From<&ContentItem> for IndexMetadata {
    fn from(item: &ContentItem) -> Self {
        let title = match (&item.kind, &item.title) {
            (ContentKind::Post, Some(title)) if !title.is_empty() => title.clone(),
            (ContentKind::Post, _) => "Untitled post".to_string(),
            (ContentKind::Comment, _) => "Comment".to_string(),
        };

        IndexMetadata {
            kind: item.kind,
            title,
            text: item.text.clone(),
            parent_id: item.parent_id,
            community_id: item.community_id,
            author: item.author.clone(),
            created_at: item.created_at,
        }
    }
}

/// Filter restricting retrieval to a subset of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    /// All indexed content
    #[default]
    Global,
    /// One community
    Community(u64),
    /// One post and its comments
    Thread(ContentId),
}

impl Scope {
    /// Whether an indexed entry falls inside this scope
    pub fn matches(&self, id: ContentId, meta: &IndexMetadata) -> bool {
        match self {
            Scope::Global => true,
            Scope::Community(community) => meta.community_id == Some(*community),
            Scope::Thread(thread) => meta.thread_of(id) == *thread,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Community(id) => write!(f, "community:{}", id),
            Scope::Thread(id) => write!(f, "thread:{}", id),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "global" || s.is_empty() {
            return Ok(Scope::Global);
        }

        let parse_id = |raw: &str| {
            raw.parse::<u64>()
                .map_err(|_| Error::Validation(format!("Invalid scope id: {}", raw)))
        };

        match s.split_once(':') {
            Some(("community", id)) => Ok(Scope::Community(parse_id(id)?)),
            Some(("thread", id)) => Ok(Scope::Thread(ContentId(parse_id(id)?))),
            _ => Err(Error::Validation(format!(
                "Invalid scope: {}. Valid forms: global, community:<id>, thread:<id>",
                s
            ))),
        }
    }
}

/// A structured reference back to source content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited content
    pub content_id: ContentId,
    /// Post or comment
    pub kind: ContentKind,
    /// Display title
    pub title: String,
    /// Bounded excerpt of the content
    pub excerpt: String,
    /// Relevance in [0, 1], rounded to 3 decimals
    pub relevance_score: f32,
    /// Link back to the content
    pub source_url: String,
    /// Parent post for comments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ContentId>,
    /// Author display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Creation time of the content
    pub created_at: DateTime<Utc>,
    /// Revision of the content the citation was built from
    pub revision: Revision,
}

/// Source locator for a piece of content
pub fn source_url(id: ContentId, kind: ContentKind, parent_id: Option<ContentId>) -> String {
    match kind {
        ContentKind::Post => format!("/posts/{}", id),
        ContentKind::Comment => format!("/posts/{}#comment-{}", parent_id.unwrap_or(id), id),
    }
}

/// Condensed source entry listed alongside an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Post or comment
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Content identifier
    pub id: ContentId,
    /// Display title
    pub title: String,
    /// Link back to the content
    pub url: String,
}

impl From<&Citation> for Source {
    fn from(citation: &Citation) -> Self {
        Source {
            kind: citation.kind,
            id: citation.content_id,
            title: citation.title.clone(),
            url: citation.source_url.clone(),
        }
    }
}
