//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StorageResult;
use crate::traits::store::PageStore;
use crate::types::page::PageRecord;

/// In-memory page store.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    pages: RwLock<HashMap<String, PageRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every stored page.
    pub async fn clear(&self) {
        self.pages.write().await.clear();
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert(&self, page: &PageRecord) -> StorageResult<()> {
        self.pages
            .write()
            .await
            .insert(page.url.clone(), page.clone());
        Ok(())
    }

    async fn get(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        Ok(self.pages.read().await.get(url).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<PageRecord>> {
        Ok(self.pages.read().await.values().cloned().collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.pages.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = MemoryStore::new();
        store
            .upsert(&PageRecord::new("https://a.example").with_title("First"))
            .await
            .unwrap();
        store
            .upsert(&PageRecord::new("https://a.example").with_title("Second"))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let page = store.get("https://a.example").await.unwrap().unwrap();
        assert_eq!(page.title, "Second");

        store.clear().await;
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
