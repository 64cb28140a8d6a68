//! Page store trait.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::page::PageRecord;

/// Persistent page storage keyed by URL.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Create the schema if it does not exist. Safe to call repeatedly.
    async fn init(&self) -> StorageResult<()>;

    /// Insert or fully replace the record for `page.url`.
    ///
    /// Runs atomically: either every column is replaced or nothing changes.
    async fn upsert(&self, page: &PageRecord) -> StorageResult<()>;

    /// Get a record by URL.
    async fn get(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// All stored records, in no particular order.
    async fn list(&self) -> StorageResult<Vec<PageRecord>>;

    /// Number of stored records.
    async fn count(&self) -> StorageResult<usize>;
}
