//! Crawl report - per-URL outcomes and batch totals.

use serde::Serialize;

use crate::error::{FailureKind, FetchError};
use crate::types::page::ContentSummary;
use crate::types::proxy::ProxyAddress;

/// Terminal outcome of one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// Page fetched and extracted
    Success {
        title: String,
        summary: ContentSummary,
    },

    /// Fetch or extraction failed; an error record was stored in its place
    Failed { kind: FailureKind, error: String },

    /// Never started because the run was cancelled
    Skipped,
}

impl CrawlOutcome {
    pub fn failed(error: &FetchError) -> Self {
        CrawlOutcome::Failed {
            kind: error.kind(),
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CrawlOutcome::Success { .. })
    }
}

/// What happened to one URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlReport {
    pub url: String,

    /// Proxy used for the final attempt
    pub proxy: Option<ProxyAddress>,

    /// Number of fetch attempts made
    pub attempts: u32,

    pub outcome: CrawlOutcome,

    /// Whether the resulting record reached the store
    pub persisted: bool,
}

/// Result of crawling one batch of URLs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    /// Per-URL results, in completion order
    pub urls: Vec<UrlReport>,

    /// Set when cancellation stopped the batch early
    pub cancelled: bool,

    /// Whole-batch attempts used (1 when the first attempt completed)
    pub batch_attempts: u32,
}

impl CrawlReport {
    /// URLs whose fetch was started.
    pub fn attempted(&self) -> usize {
        self.urls
            .iter()
            .filter(|u| !matches!(u.outcome, CrawlOutcome::Skipped))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.urls.iter().filter(|u| u.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.urls
            .iter()
            .filter(|u| matches!(u.outcome, CrawlOutcome::Failed { .. }))
            .count()
    }

    /// URLs whose record could not be stored.
    pub fn persist_failures(&self) -> usize {
        self.urls
            .iter()
            .filter(|u| !u.persisted && !matches!(u.outcome, CrawlOutcome::Skipped))
            .count()
    }

    /// Whether every URL reached a terminal outcome.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self
                .urls
                .iter()
                .all(|u| !matches!(u.outcome, CrawlOutcome::Skipped))
    }

    /// Report entry for a URL.
    pub fn get(&self, url: &str) -> Option<&UrlReport> {
        self.urls.iter().find(|u| u.url == url)
    }
}
