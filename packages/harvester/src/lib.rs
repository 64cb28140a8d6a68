//! Proxy-validated web harvesting with a searchable local corpus.
//!
//! The pipeline has three stages:
//!
//! 1. **Proxies** - candidates are validated concurrently against echo
//!    endpoints; working ones are persisted as the known-good list and
//!    re-validated first on the next run.
//! 2. **Crawl** - a bounded worker pool fetches URLs through the verified
//!    proxies (or directly), retries transient failures with a different
//!    proxy, extracts page entities and upserts one record per URL.
//! 3. **Query** - stored pages are scored against search terms and can be
//!    narrowed to content types.
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::{HarvestContext, HarvestConfig, QueryEngine, QueryRequest, SqliteStore};
//! use std::sync::Arc;
//!
//! let config = HarvestConfig::from_env()?;
//! let store = Arc::new(SqliteStore::new(&config.database_url).await?);
//! let engine = QueryEngine::new(store, &config.query);
//!
//! let ctx = HarvestContext::new(config);
//! let results = engine
//!     .search(&ctx, &QueryRequest::new().with_terms(["laptop"]))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams for fetching, storage, proxy sources and search
//! - [`types`] - Page records, proxies, queries and tuning config
//! - [`proxy`] - Proxy sources, validation and the verified pool
//! - [`crawl`] - Fetcher, autothrottle and the batch crawler
//! - [`extract`] - HTML entity extraction
//! - [`stores`] - Page stores (SQLite, in-memory)
//! - [`query`] - Relevance ranking and query transcripts
//! - [`harvest`] - Discovery plus the end-to-end run
//! - [`testing`] - Mock implementations for testing

pub mod config;
pub mod context;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod proxy;
pub mod query;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::HarvestConfig;
pub use context::HarvestContext;
pub use crawl::{AutoThrottle, CrawlOutcome, CrawlReport, Crawler, HttpFetcher, UrlReport};
pub use error::{FailureKind, FetchError, HarvestError, ProxyError, Result, StorageError};
pub use extract::{ContentExtractor, ExtractedPage, FileProbe, HttpFileProbe};
pub use harvest::{DiscoveryHistory, HarvestRequest, Harvester};
pub use proxy::{
    FileProxySource, HttpProxyChecker, KnownGoodList, ProxyChecker, ProxyPool, ProxySnapshot,
    ProxyValidator, RefreshOutcome,
};
pub use query::{main_words, rank, AuditLog, QueryEngine};
pub use stores::{MemoryStore, SqliteStore};
pub use traits::{
    fetcher::{FetchedPage, Fetcher},
    proxy_source::ProxySource,
    searcher::SearchProvider,
    store::PageStore,
};
pub use types::{
    config::{
        CrawlConfig, ExhaustionPolicy, PoolConfig, ProxySchemePolicy, QueryConfig, ValidatorConfig,
    },
    page::{FileRef, ImageRef, LinkRef, MediaRef, OpenGraph, PageRecord, TwitterCard},
    proxy::{ProxyAddress, ProxyRecord},
    query::{ContentType, QueryRequest, ScoredPage},
};
