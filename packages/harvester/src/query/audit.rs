//! Per-query audit transcripts.

use chrono::Local;
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::types::query::ScoredPage;

static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

const RULE_WIDTH: usize = 80;

/// Writes one human-readable transcript per query.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a transcript for `terms` and return the file written.
    pub async fn record(&self, terms: &[String], results: &[ScoredPage]) -> Result<PathBuf> {
        let timestamp = Local::now().format("%d-%m-%Y_%H-%M-%S").to_string();
        let path = self.dir.join(transcript_name(terms, &timestamp));

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(render(terms, &timestamp, results).as_bytes())
            .await?;
        file.flush().await?;

        tracing::info!(path = %path.display(), results = results.len(), "Results written");
        Ok(path)
    }
}

/// `<terms joined by _ | all>__<timestamp>.txt`, made filesystem-safe.
pub fn transcript_name(terms: &[String], timestamp: &str) -> String {
    let joined = if terms.is_empty() {
        "all".to_string()
    } else {
        terms.join("_")
    };
    let name = format!("{}__{}.txt", joined, timestamp);
    INVALID_FILENAME_CHARS.replace_all(&name, "_").into_owned()
}

fn render(terms: &[String], timestamp: &str, results: &[ScoredPage]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "Query: {:?}", terms);
    let _ = writeln!(out, "Timestamp: {}", timestamp);
    let _ = writeln!(out, "{}\n", rule);

    for (idx, result) in results.iter().enumerate() {
        let _ = writeln!(out, "Result #{}:", idx + 1);
        for (key, value) in fields(result) {
            let _ = writeln!(out, "  {}: {}", key, value);
        }
        let _ = writeln!(out, "{}\n", rule);
    }

    let _ = writeln!(out, "\nTotal results: {}", results.len());
    out
}

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn fields(result: &ScoredPage) -> Vec<(&'static str, String)> {
    let page = &result.page;
    vec![
        ("url", page.url.clone()),
        ("title", page.title.clone()),
        ("body_content", page.body_content.clone()),
        ("meta_description", page.meta_description.clone()),
        ("meta_keywords", page.meta_keywords.clone()),
        ("images", json(&page.images)),
        ("videos", json(&page.videos)),
        ("audio", json(&page.audio)),
        ("links", json(&page.links)),
        ("social_media", json(&page.social_media)),
        ("files", json(&page.files)),
        ("og_title", page.open_graph.title.clone()),
        ("og_description", page.open_graph.description.clone()),
        ("og_image", page.open_graph.image.clone()),
        ("twitter_card", page.twitter.card.clone()),
        ("twitter_title", page.twitter.title.clone()),
        ("twitter_description", page.twitter.description.clone()),
        ("twitter_image", page.twitter.image.clone()),
        ("canonical_url", page.canonical_url.clone()),
        ("robots", page.robots.clone()),
        ("author", page.author.clone()),
        ("published_date", page.published_date.clone()),
        ("modified_date", page.modified_date.clone()),
        ("timestamp", page.fetched_at.to_rfc3339()),
        ("relevance", result.relevance.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::page::PageRecord;

    #[test]
    fn test_transcript_name() {
        assert_eq!(
            transcript_name(&[], "01-02-2024_10-11-12"),
            "all__01-02-2024_10-11-12.txt"
        );
        assert_eq!(
            transcript_name(&["rust".into(), "a/b".into(), "c:d?".into()], "01-02-2024_10-11-12"),
            "rust_a_b_c_d___01-02-2024_10-11-12.txt"
        );
    }

    #[tokio::test]
    async fn test_record_writes_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("scraped_results"));
        let results = vec![ScoredPage {
            page: PageRecord::new("https://a.example").with_title("Rust"),
            relevance: 10,
        }];

        let path = audit.record(&["rust".to_string()], &results).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().starts_with("rust__"));
        assert!(contents.starts_with("Query: [\"rust\"]\nTimestamp: "));
        assert!(contents.contains("Result #1:\n  url: https://a.example\n  title: Rust\n"));
        assert!(contents.contains("  relevance: 10\n"));
        assert!(contents.ends_with("\nTotal results: 1\n"));
    }
}
