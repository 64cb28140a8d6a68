//! Typed errors for the harvester library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! per-URL fetch failure from a storage failure from a batch that never
//! completed.

use serde::Serialize;
use thiserror::Error;

/// HTTP statuses that are worth another attempt.
pub const RETRY_STATUSES: [u16; 8] = [500, 502, 503, 504, 522, 524, 408, 429];

/// Terminal or transient failure of a single URL.
///
/// Every variant carries plain data so an outcome can be cloned into
/// reports and mock scripts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Host name could not be resolved
    #[error("DNS lookup failed for {host}")]
    Dns { host: String },

    /// Request did not complete within the per-request timeout
    #[error("request timeout for {url}")]
    Timeout { url: String },

    /// Connection refused, reset or otherwise broken
    #[error("connection error: {0}")]
    Connection(String),

    /// Non-200 response (after retries, if the status was transient)
    #[error("status code: {status}")]
    Status { status: u16 },

    /// Response was not an HTML document
    #[error("invalid content type: {content_type}")]
    NonHtml { content_type: String },

    /// Response had no body
    #[error("empty response")]
    EmptyBody,

    /// Body could not be turned into a page record
    #[error("parse error: {0}")]
    Parse(String),

    /// URL could not be parsed or requested
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Content,
    Extraction,
}

impl FetchError {
    /// Whether the request may succeed if tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connection(_) => true,
            FetchError::Status { status } => RETRY_STATUSES.contains(status),
            _ => false,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Dns { .. }
            | FetchError::Timeout { .. }
            | FetchError::Connection(_)
            | FetchError::InvalidUrl { .. } => FailureKind::Network,
            FetchError::Status { .. } | FetchError::NonHtml { .. } | FetchError::EmptyBody => {
                FailureKind::Content
            }
            FetchError::Parse(_) => FailureKind::Extraction,
        }
    }

    /// Classify a transport error from reqwest.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }
        if err.is_builder() {
            return FetchError::InvalidUrl {
                url: url.to_string(),
            };
        }
        if is_dns_failure(err) {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string());
            return FetchError::Dns { host };
        }
        FetchError::Connection(err.to_string())
    }
}

/// Walk the source chain looking for a resolver failure.
fn is_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Errors from the page store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity list could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row could not be turned back into a record
    #[error("invalid stored record {url}: {reason}")]
    InvalidRecord { url: String, reason: String },
}

/// Errors from proxy list handling.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Reading or writing a proxy list file failed
    #[error("proxy list I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Candidate source failed to produce addresses
    #[error("proxy source error: {0}")]
    Source(String),

    /// Address is not in host:port form
    #[error("invalid proxy address: {0}")]
    InvalidAddress(String),

    /// A single proxy check failed
    #[error("proxy check failed: {0}")]
    Check(String),
}

/// Top-level errors surfaced to callers of the pipeline.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The crawl engine failed on every batch attempt
    #[error("crawl batch failed after {attempts} attempts: {reason}")]
    Batch { attempts: u32, reason: String },

    /// The crawl engine failed to start or completed abnormally
    #[error("crawl engine error: {0}")]
    Engine(String),

    /// No verified proxies after a full refresh and the policy forbids direct fetches
    #[error("no verified proxies available")]
    ProxyExhausted,

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Proxy list handling failed
    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// Configuration is missing or malformed
    #[error("config error: {0}")]
    Config(String),

    /// URL discovery failed
    #[error("search error: {0}")]
    Search(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for single-URL fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for proxy list operations.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;
