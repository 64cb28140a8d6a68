//! URL discovery trait.

use async_trait::async_trait;

use crate::error::Result;

/// Turns a free-text query into candidate URLs to crawl.
///
/// The web search mechanism itself is supplied by the application.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `limit` result URLs for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}
