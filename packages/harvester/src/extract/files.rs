//! Downloadable file detection.
//!
//! A link counts as a file only when its URL ends with a known extension
//! AND a HEAD request reports a downloadable content type.

use async_trait::async_trait;
use std::time::Duration;

use crate::crawl::fetcher::random_user_agent;
use crate::error::{FetchError, FetchResult, HarvestError, Result};

/// Extensions that make a link a file candidate.
pub const FILE_EXTENSIONS: [&str; 8] = [
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".csv", ".zip", ".rar",
];

/// Content types accepted as downloadable (substring match).
pub const DOWNLOADABLE_TYPES: [&str; 7] = [
    "application/pdf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument",
    "application/zip",
    "application/x-rar-compressed",
    "application/octet-stream",
];

/// Whether the URL ends with one of [`FILE_EXTENSIONS`] (case-insensitive).
pub fn has_file_extension(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Whether a `Content-Type` value names a downloadable document.
pub fn is_downloadable(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    DOWNLOADABLE_TYPES.iter().any(|t| lower.contains(t))
}

/// Looks up the content type of a file URL without downloading it.
#[async_trait]
pub trait FileProbe: Send + Sync {
    /// `Content-Type` reported for `url`, empty when the header is missing.
    async fn content_type(&self, url: &str) -> FetchResult<String>;
}

/// HEAD-request probe with a short timeout, following redirects.
pub struct HttpFileProbe {
    client: reqwest::Client,
}

impl HttpFileProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HEAD client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FileProbe for HttpFileProbe {
    async fn content_type(&self, url: &str) -> FetchResult<String> {
        let response = self
            .client
            .head(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }
}
