//! Page types - the persisted page record and its entity sub-records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title stored for pages whose fetch or extraction failed.
pub const ERROR_TITLE: &str = "Error";

/// An `<img>` found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub title: String,
}

/// A `<video>`, `<iframe>` or `<audio>` source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub src: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub title: String,
}

/// An anchor with an `href`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: String,
}

/// A downloadable file confirmed by its content type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Open Graph meta fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGraph {
    pub title: String,
    pub description: String,
    pub image: String,
}

/// Twitter card meta fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterCard {
    pub card: String,
    pub title: String,
    pub description: String,
    pub image: String,
}

/// Everything extracted from one URL. Exactly one record exists per URL;
/// a re-fetch replaces every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Unique key
    pub url: String,

    pub title: String,

    /// Visible text with boilerplate removed
    pub body_content: String,

    pub meta_description: String,
    pub meta_keywords: String,

    pub images: Vec<ImageRef>,
    pub videos: Vec<MediaRef>,
    pub audio: Vec<MediaRef>,
    pub links: Vec<LinkRef>,
    pub social_media: Vec<LinkRef>,
    pub files: Vec<FileRef>,

    pub open_graph: OpenGraph,
    pub twitter: TwitterCard,

    pub canonical_url: String,
    pub robots: String,
    pub author: String,
    pub published_date: String,
    pub modified_date: String,

    /// When the page was fetched (or failed)
    pub fetched_at: DateTime<Utc>,
}

impl PageRecord {
    /// Create an empty record for a URL, stamped now.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            body_content: String::new(),
            meta_description: String::new(),
            meta_keywords: String::new(),
            images: Vec::new(),
            videos: Vec::new(),
            audio: Vec::new(),
            links: Vec::new(),
            social_media: Vec::new(),
            files: Vec::new(),
            open_graph: OpenGraph::default(),
            twitter: TwitterCard::default(),
            canonical_url: String::new(),
            robots: String::new(),
            author: String::new(),
            published_date: String::new(),
            modified_date: String::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Record stored in place of a page that could not be fetched or parsed.
    pub fn error(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        let mut record = Self::new(url);
        record.title = ERROR_TITLE.to_string();
        record.body_content = format!("Failed: {}", message);
        record
    }

    pub fn is_error(&self) -> bool {
        self.title == ERROR_TITLE && self.body_content.starts_with("Failed: ")
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the body text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_content = body.into();
        self
    }

    /// Set the meta description.
    pub fn with_meta_description(mut self, description: impl Into<String>) -> Self {
        self.meta_description = description.into();
        self
    }

    /// Set the fetched timestamp.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Body length in characters (not bytes).
    pub fn body_len(&self) -> usize {
        self.body_content.chars().count()
    }

    /// Entity counts for reporting.
    pub fn summary(&self) -> ContentSummary {
        ContentSummary {
            images: self.images.len(),
            videos: self.videos.len(),
            audio: self.audio.len(),
            links: self.links.len(),
            social_media: self.social_media.len(),
            files: self.files.len(),
            content_length: self.body_len(),
        }
    }
}

/// Per-page entity counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentSummary {
    pub images: usize,
    pub videos: usize,
    pub audio: usize,
    pub links: usize,
    pub social_media: usize,
    pub files: usize,
    pub content_length: usize,
}
