//! Query types - requests, content-type filters and scored results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::page::PageRecord;

/// Media category a query can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Images,
    Videos,
    Files,
    Links,
    Text,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Images,
        ContentType::Videos,
        ContentType::Files,
        ContentType::Links,
        ContentType::Text,
    ];

    /// Whether a page belongs to this category.
    ///
    /// `Text` pages have fewer than 3 images, fewer than 2 videos and more
    /// than 100 characters of body text.
    pub fn matches(&self, page: &PageRecord) -> bool {
        match self {
            ContentType::Images => !page.images.is_empty(),
            ContentType::Videos => !page.videos.is_empty(),
            ContentType::Files => !page.files.is_empty(),
            ContentType::Links => !page.links.is_empty(),
            ContentType::Text => {
                page.images.len() < 3 && page.videos.len() < 2 && page.body_len() > 100
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Images => "images",
            ContentType::Videos => "videos",
            ContentType::Files => "files",
            ContentType::Links => "links",
            ContentType::Text => "text",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown content type: {s}"))
    }
}

/// A relevance query over the stored corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Terms that must all appear (each in title, description or body)
    #[serde(default)]
    pub terms: Vec<String>,

    /// Categories OR'd together; empty = no filtering
    #[serde(default)]
    pub content_types: BTreeSet<ContentType>,

    /// Maximum results; 0 = unlimited
    pub limit: usize,
}

impl QueryRequest {
    /// Create a query with no terms and no filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search terms.
    pub fn with_terms(mut self, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.terms = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Add a content-type filter.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_types.insert(content_type);
        self
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether a page passes the content-type filters.
    pub fn matches_content_types(&self, page: &PageRecord) -> bool {
        self.content_types.is_empty() || self.content_types.iter().any(|ct| ct.matches(page))
    }
}

/// A stored page with its computed relevance (not persisted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPage {
    #[serde(flatten)]
    pub page: PageRecord,
    pub relevance: u32,
}
