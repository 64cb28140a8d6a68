//! SQLite storage implementation.
//!
//! One `pages` row per URL. Entity lists are stored as JSON text and the
//! fetch time as an RFC 3339 string, so the file stays readable with the
//! plain `sqlite3` shell.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{StorageError, StorageResult};
use crate::traits::store::PageStore;
use crate::types::page::{OpenGraph, PageRecord, TwitterCard};

// NULL-tolerant so rows written by older tools still decode.
const SELECT_COLUMNS: &str = "url, \
     COALESCE(title, '') AS title, \
     COALESCE(body_content, '') AS body_content, \
     COALESCE(meta_description, '') AS meta_description, \
     COALESCE(meta_keywords, '') AS meta_keywords, \
     COALESCE(images, '') AS images, \
     COALESCE(videos, '') AS videos, \
     COALESCE(audio, '') AS audio, \
     COALESCE(links, '') AS links, \
     COALESCE(social_media, '') AS social_media, \
     COALESCE(files, '') AS files, \
     COALESCE(og_title, '') AS og_title, \
     COALESCE(og_description, '') AS og_description, \
     COALESCE(og_image, '') AS og_image, \
     COALESCE(twitter_card, '') AS twitter_card, \
     COALESCE(twitter_title, '') AS twitter_title, \
     COALESCE(twitter_description, '') AS twitter_description, \
     COALESCE(twitter_image, '') AS twitter_image, \
     COALESCE(canonical_url, '') AS canonical_url, \
     COALESCE(robots, '') AS robots, \
     COALESCE(author, '') AS author, \
     COALESCE(published_date, '') AS published_date, \
     COALESCE(modified_date, '') AS modified_date, \
     COALESCE(timestamp, '') AS timestamp";

/// Timestamp layout used by rows written before RFC 3339 storage.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-based page store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and make sure the schema exists.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://database/scraped_data.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Every pooled connection to `:memory:` would open its own database, so
    /// the pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct PageRow {
    url: String,
    title: String,
    body_content: String,
    meta_description: String,
    meta_keywords: String,
    images: String,
    videos: String,
    audio: String,
    links: String,
    social_media: String,
    files: String,
    og_title: String,
    og_description: String,
    og_image: String,
    twitter_card: String,
    twitter_title: String,
    twitter_description: String,
    twitter_image: String,
    canonical_url: String,
    robots: String,
    author: String,
    published_date: String,
    modified_date: String,
    timestamp: String,
}

impl PageRow {
    fn into_record(self) -> StorageResult<PageRecord> {
        let fetched_at =
            parse_timestamp(&self.timestamp).ok_or_else(|| StorageError::InvalidRecord {
                url: self.url.clone(),
                reason: format!("invalid timestamp: {:?}", self.timestamp),
            })?;

        Ok(PageRecord {
            images: json_list(&self.images)?,
            videos: json_list(&self.videos)?,
            audio: json_list(&self.audio)?,
            links: json_list(&self.links)?,
            social_media: json_list(&self.social_media)?,
            files: json_list(&self.files)?,
            url: self.url,
            title: self.title,
            body_content: self.body_content,
            meta_description: self.meta_description,
            meta_keywords: self.meta_keywords,
            open_graph: OpenGraph {
                title: self.og_title,
                description: self.og_description,
                image: self.og_image,
            },
            twitter: TwitterCard {
                card: self.twitter_card,
                title: self.twitter_title,
                description: self.twitter_description,
                image: self.twitter_image,
            },
            canonical_url: self.canonical_url,
            robots: self.robots,
            author: self.author,
            published_date: self.published_date,
            modified_date: self.modified_date,
            fetched_at,
        })
    }
}

/// RFC 3339, or the legacy local-time layout.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw.trim(), LEGACY_TIMESTAMP_FORMAT).ok()?;
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    )
}

/// A JSON list column; blank means empty.
fn json_list<T: DeserializeOwned>(raw: &str) -> StorageResult<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl PageStore for SqliteStore {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                url TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                body_content TEXT NOT NULL DEFAULT '',
                meta_description TEXT NOT NULL DEFAULT '',
                meta_keywords TEXT NOT NULL DEFAULT '',
                images TEXT NOT NULL DEFAULT '[]',
                videos TEXT NOT NULL DEFAULT '[]',
                audio TEXT NOT NULL DEFAULT '[]',
                links TEXT NOT NULL DEFAULT '[]',
                social_media TEXT NOT NULL DEFAULT '[]',
                files TEXT NOT NULL DEFAULT '[]',
                og_title TEXT NOT NULL DEFAULT '',
                og_description TEXT NOT NULL DEFAULT '',
                og_image TEXT NOT NULL DEFAULT '',
                twitter_card TEXT NOT NULL DEFAULT '',
                twitter_title TEXT NOT NULL DEFAULT '',
                twitter_description TEXT NOT NULL DEFAULT '',
                twitter_image TEXT NOT NULL DEFAULT '',
                canonical_url TEXT NOT NULL DEFAULT '',
                robots TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                published_date TEXT NOT NULL DEFAULT '',
                modified_date TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pages_timestamp ON pages(timestamp);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, page: &PageRecord) -> StorageResult<()> {
        let images = serde_json::to_string(&page.images)?;
        let videos = serde_json::to_string(&page.videos)?;
        let audio = serde_json::to_string(&page.audio)?;
        let links = serde_json::to_string(&page.links)?;
        let social_media = serde_json::to_string(&page.social_media)?;
        let files = serde_json::to_string(&page.files)?;
        let timestamp = page
            .fetched_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO pages (
                url, title, body_content, meta_description, meta_keywords,
                images, videos, audio, links, social_media, files,
                og_title, og_description, og_image,
                twitter_card, twitter_title, twitter_description, twitter_image,
                canonical_url, robots, author, published_date, modified_date, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                body_content = excluded.body_content,
                meta_description = excluded.meta_description,
                meta_keywords = excluded.meta_keywords,
                images = excluded.images,
                videos = excluded.videos,
                audio = excluded.audio,
                links = excluded.links,
                social_media = excluded.social_media,
                files = excluded.files,
                og_title = excluded.og_title,
                og_description = excluded.og_description,
                og_image = excluded.og_image,
                twitter_card = excluded.twitter_card,
                twitter_title = excluded.twitter_title,
                twitter_description = excluded.twitter_description,
                twitter_image = excluded.twitter_image,
                canonical_url = excluded.canonical_url,
                robots = excluded.robots,
                author = excluded.author,
                published_date = excluded.published_date,
                modified_date = excluded.modified_date,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&page.url)
        .bind(&page.title)
        .bind(&page.body_content)
        .bind(&page.meta_description)
        .bind(&page.meta_keywords)
        .bind(&images)
        .bind(&videos)
        .bind(&audio)
        .bind(&links)
        .bind(&social_media)
        .bind(&files)
        .bind(&page.open_graph.title)
        .bind(&page.open_graph.description)
        .bind(&page.open_graph.image)
        .bind(&page.twitter.card)
        .bind(&page.twitter.title)
        .bind(&page.twitter.description)
        .bind(&page.twitter.image)
        .bind(&page.canonical_url)
        .bind(&page.robots)
        .bind(&page.author)
        .bind(&page.published_date)
        .bind(&page.modified_date)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(url = %page.url, error = %rollback, "Rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn get(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let row = sqlx::query_as::<_, PageRow>(&format!(
            "SELECT {} FROM pages WHERE url = ?",
            SELECT_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PageRow::into_record).transpose()
    }

    async fn list(&self) -> StorageResult<Vec<PageRecord>> {
        let rows =
            sqlx::query_as::<_, PageRow>(&format!("SELECT {} FROM pages", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let url = row.url.clone();
                match row.into_record() {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "Skipping unreadable stored page");
                        None
                    }
                }
            })
            .collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::page::{FileRef, ImageRef, LinkRef};

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn sample_page() -> PageRecord {
        let mut page = PageRecord::new("https://example.com/page1")
            .with_title("Rust Tips")
            .with_body("Ownership and borrowing explained")
            .with_meta_description("A short guide")
            .with_fetched_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
        page.images.push(ImageRef {
            src: "https://example.com/a.png".into(),
            alt: "diagram".into(),
            title: String::new(),
        });
        page.links.push(LinkRef {
            url: "https://example.com/next".into(),
            text: "Next".into(),
            title: String::new(),
        });
        page.files.push(FileRef {
            url: "https://example.com/guide.pdf".into(),
            title: "Guide".into(),
        });
        page.open_graph.title = "OG Rust Tips".into();
        page.twitter.card = "summary".into();
        page
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = test_store().await;
        let page = sample_page();

        store.upsert(&page).await.unwrap();

        let retrieved = store.get(&page.url).await.unwrap().unwrap();
        assert_eq!(retrieved, page);
        assert!(store.get("https://example.com/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_all_fields() {
        let store = test_store().await;
        let page = sample_page();
        store.upsert(&page).await.unwrap();

        let replacement = PageRecord::error(&page.url, "status code: 404");
        store.upsert(&replacement).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let retrieved = store.get(&page.url).await.unwrap().unwrap();
        assert_eq!(retrieved.title, "Error");
        assert!(retrieved.images.is_empty());
        assert!(retrieved.files.is_empty());
        assert_eq!(retrieved.open_graph, OpenGraph::default());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = test_store().await;
        let page = sample_page();

        store.upsert(&page).await.unwrap();
        store.upsert(&page).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.list().await.unwrap(), vec![page]);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = test_store().await;
        store.upsert(&sample_page()).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_rows_are_readable() {
        let store = test_store().await;
        store.upsert(&sample_page()).await.unwrap();

        sqlx::query("INSERT INTO pages (url, title, timestamp) VALUES (?, ?, ?)")
            .bind("https://legacy.example")
            .bind("Legacy")
            .bind("2024-01-01 10:00:00")
            .execute(store.pool())
            .await
            .unwrap();

        let legacy = store.get("https://legacy.example").await.unwrap().unwrap();
        assert_eq!(legacy.title, "Legacy");
        assert!(legacy.images.is_empty());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_rows() {
        let store = test_store().await;
        let page = sample_page();
        store.upsert(&page).await.unwrap();

        sqlx::query("INSERT INTO pages (url, images, timestamp) VALUES (?, ?, ?)")
            .bind("https://broken.example")
            .bind("{not json")
            .bind("yesterday")
            .execute(store.pool())
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap(), vec![page]);
        assert!(store.get("https://broken.example").await.is_err());
    }

    #[test]
    fn test_parse_timestamp() {
        let utc = parse_timestamp("2024-05-01T12:30:00.000000Z").unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
        assert!(parse_timestamp("2024-05-01 12:30:00").is_some());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pages.db").display());

        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.upsert(&sample_page()).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteStore::new(&url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
