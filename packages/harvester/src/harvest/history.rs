//! Discovery history - every URL a search produced, newest first.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;

/// One discovered URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,

    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    urls: Vec<DiscoveredUrl>,
}

/// JSON file of discovered URLs.
#[derive(Debug, Clone)]
pub struct DiscoveryHistory {
    path: PathBuf,
}

impl DiscoveryHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored entries, newest first. A missing or corrupt file reads as empty.
    pub async fn load(&self) -> Vec<DiscoveredUrl> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<HistoryFile>(&text) {
            Ok(file) => file.urls,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discovery history unreadable, starting fresh"
                );
                Vec::new()
            }
        }
    }

    /// Prepend `urls`, all stamped with the current time.
    pub async fn append(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut entries = self.load().await;
        for url in urls {
            entries.insert(
                0,
                DiscoveredUrl {
                    url: url.clone(),
                    timestamp: timestamp.clone(),
                },
            );
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&HistoryFile { urls: entries })
            .map_err(crate::error::StorageError::from)?;
        tokio::fs::write(&self.path, json).await?;

        info!(added = urls.len(), timestamp = %timestamp, "URLs added to discovery history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_and_corrupt_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = DiscoveryHistory::new(dir.path().join("output.json"));
        assert!(history.load().await.is_empty());

        tokio::fs::write(history.path(), "{not json").await.unwrap();
        assert!(history.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_prepends() {
        let dir = tempfile::tempdir().unwrap();
        let history = DiscoveryHistory::new(dir.path().join("nested/output.json"));

        history.append(&["https://a.example".into()]).await.unwrap();
        history
            .append(&["https://b.example".into(), "https://c.example".into()])
            .await
            .unwrap();

        let urls: Vec<String> = history.load().await.into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["https://c.example", "https://b.example", "https://a.example"]);

        let text = tokio::fs::read_to_string(history.path()).await.unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["urls"][2]["url"], "https://a.example");
        assert_eq!(raw["urls"][0]["timestamp"].as_str().unwrap().len(), 19);
    }
}
