//! Fetcher trait - one HTTP GET, optionally through a forward proxy.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchResult;
use crate::types::proxy::ProxyAddress;

/// Raw response for a single URL.
///
/// Any HTTP response is returned as-is; status and content-type checks are
/// the caller's job. Only transport failures become errors.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    pub status: u16,

    /// `Content-Type` header, empty when absent
    pub content_type: String,

    pub body: Vec<u8>,

    /// Request start to body fully read
    pub elapsed: Duration,
}

impl FetchedPage {
    /// A 200 `text/html` response, handy for tests and mocks.
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into().into_bytes(),
            elapsed: Duration::from_millis(50),
        }
    }

    /// Set the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Whether the content type declares an HTML document.
    pub fn is_html(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains("text/html")
    }
}

/// HTTP fetcher used by the crawl workers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`, routed through `proxy` when one is given.
    async fn fetch(&self, url: &str, proxy: Option<&ProxyAddress>) -> FetchResult<FetchedPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        let page = FetchedPage::html("https://a.example", "<p>hi</p>");
        assert!(page.is_html());
        assert!(!page.with_content_type("application/json").is_html());
        assert!(FetchedPage::html("u", "")
            .with_content_type("TEXT/HTML")
            .is_html());
    }
}
