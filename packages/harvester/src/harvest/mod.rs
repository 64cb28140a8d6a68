//! End-to-end harvest: discover URLs, refresh proxies, crawl.

pub mod history;

pub use history::{DiscoveredUrl, DiscoveryHistory};

use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::context::HarvestContext;
use crate::crawl::{CrawlReport, Crawler};
use crate::error::{HarvestError, Result};
use crate::proxy::ProxyPool;
use crate::traits::searcher::SearchProvider;
use crate::traits::store::PageStore;

/// Number of search results requested per discovery query.
pub const DISCOVERY_LIMIT: usize = 10;

/// What to harvest: explicit URLs, or a query to discover them.
#[derive(Debug, Clone, Default)]
pub struct HarvestRequest {
    pub query: Option<String>,
    pub urls: Vec<String>,
}

impl HarvestRequest {
    pub fn urls(urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            query: None,
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            urls: Vec::new(),
        }
    }
}

/// Wires discovery, the proxy pool and the crawler together.
pub struct Harvester {
    searcher: Option<Arc<dyn SearchProvider>>,
    store: Arc<dyn PageStore>,
    pool: Arc<ProxyPool>,
    crawler: Crawler,
    history: DiscoveryHistory,
}

impl Harvester {
    pub fn new(
        searcher: Option<Arc<dyn SearchProvider>>,
        store: Arc<dyn PageStore>,
        pool: Arc<ProxyPool>,
        crawler: Crawler,
        history: DiscoveryHistory,
    ) -> Self {
        Self {
            searcher,
            store,
            pool,
            crawler,
            history,
        }
    }

    /// Run one harvest. Returns `Ok(None)` when there was nothing to crawl.
    pub async fn run(
        &self,
        ctx: &HarvestContext,
        request: HarvestRequest,
    ) -> Result<Option<CrawlReport>> {
        self.run_inner(ctx, request)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run_inner(
        &self,
        ctx: &HarvestContext,
        request: HarvestRequest,
    ) -> Result<Option<CrawlReport>> {
        self.store.init().await?;

        let mut urls = request.urls;
        if urls.is_empty() {
            if let Some(query) = request.query.as_deref() {
                urls = self.discover(query).await?;
            }
        }

        if urls.is_empty() {
            warn!("No URLs to scrape");
            return Ok(None);
        }

        let outcome = self.pool.refresh(ctx).await?;
        info!(?outcome, "Proxy pool refreshed");
        self.pool.check_exhaustion(outcome)?;

        let snapshot = self.pool.snapshot();
        let max_retries = ctx.config().crawl.max_retries;
        let report = self
            .crawler
            .crawl(ctx, &urls, &snapshot, max_retries)
            .await?;

        info!(urls = urls.len(), succeeded = report.succeeded(), "Scraping completed");
        Ok(Some(report))
    }

    /// Search for `query`, keeping http(s) results and recording them.
    async fn discover(&self, query: &str) -> Result<Vec<String>> {
        let Some(searcher) = &self.searcher else {
            return Err(HarvestError::Search(
                "no search provider configured for query discovery".to_string(),
            ));
        };

        let urls: Vec<String> = match searcher.search(query, DISCOVERY_LIMIT).await {
            Ok(found) => found
                .into_iter()
                .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                .collect(),
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                Vec::new()
            }
        };

        info!(query, found = urls.len(), "Discovered URLs");
        if let Err(e) = self.history.append(&urls).await {
            warn!(
                path = %self.history.path().display(),
                error = %e,
                "Failed to record discovered URLs"
            );
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarvestConfig;
    use crate::proxy::ProxyValidator;
    use crate::stores::MemoryStore;
    use crate::testing::{
        FailingStore, MockFetcher, MockFileProbe, MockProxyChecker, MockSearchProvider,
        StaticProxySource,
    };
    use crate::types::config::{CrawlConfig, ExhaustionPolicy, PoolConfig, ValidatorConfig};

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: HarvestContext,
        fetcher: MockFetcher,
        search: MockSearchProvider,
        store: Arc<MemoryStore>,
        history: DiscoveryHistory,
    }

    impl Fixture {
        fn new(fetcher: MockFetcher, search: MockSearchProvider) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = HarvestConfig::with_data_dir(dir.path());
            config.crawl = CrawlConfig::default().without_delays().with_batch_retries(1, 0);
            let history = DiscoveryHistory::new(config.discovery_history_path());
            Self {
                ctx: HarvestContext::new(config),
                _dir: dir,
                fetcher,
                search,
                store: Arc::new(MemoryStore::new()),
                history,
            }
        }

        fn harvester(&self, exhaustion: ExhaustionPolicy, store: Arc<dyn PageStore>) -> Harvester {
            let config = self.ctx.config();
            let pool = ProxyPool::new(
                ProxyValidator::new(Arc::new(MockProxyChecker::new()), ValidatorConfig::default()),
                Arc::new(StaticProxySource::new(Vec::new())),
                PoolConfig::new(config.pool.known_good_path.clone()).with_exhaustion(exhaustion),
            );
            let crawler = Crawler::new(
                Arc::new(self.fetcher.clone()),
                store.clone(),
                Arc::new(MockFileProbe::new()),
                config.crawl.clone(),
            );
            Harvester::new(
                Some(Arc::new(self.search.clone())),
                store,
                Arc::new(pool),
                crawler,
                self.history.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_query_discovers_and_crawls() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let search = MockSearchProvider::new()
            .with_results("rust crawler", vec!["https://a.example/", "ftp://files.example/x"]);
        let fx = Fixture::new(fetcher, search);

        let report = fx
            .harvester(ExhaustionPolicy::ProceedDirect, fx.store.clone())
            .run(&fx.ctx, HarvestRequest::query("rust crawler"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.attempted(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(fx.search.queries(), vec!["rust crawler"]);
        assert_eq!(fx.history.load().await.len(), 1);
        assert_eq!(fx.fetcher.calls()[0].1, None);
    }

    #[tokio::test]
    async fn test_explicit_urls_skip_search() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let fx = Fixture::new(fetcher, MockSearchProvider::new());

        let request = HarvestRequest {
            query: Some("ignored".into()),
            urls: vec!["https://a.example/".into()],
        };
        let report = fx
            .harvester(ExhaustionPolicy::ProceedDirect, fx.store.clone())
            .run(&fx.ctx, request)
            .await
            .unwrap();

        assert!(report.is_some());
        assert!(fx.search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_crawl() {
        let fx = Fixture::new(MockFetcher::new(), MockSearchProvider::new());
        let harvester = fx.harvester(ExhaustionPolicy::ProceedDirect, fx.store.clone());

        assert!(harvester.run(&fx.ctx, HarvestRequest::default()).await.unwrap().is_none());
        assert!(harvester
            .run(&fx.ctx, HarvestRequest::query("no hits"))
            .await
            .unwrap()
            .is_none());
        assert!(fx.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_fail_policy_aborts() {
        let fx = Fixture::new(MockFetcher::new(), MockSearchProvider::new());
        let err = fx
            .harvester(ExhaustionPolicy::Fail, fx.store.clone())
            .run(&fx.ctx, HarvestRequest::urls(["https://a.example/"]))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::ProxyExhausted));
        assert!(fx.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_init_failure_surfaces() {
        let fx = Fixture::new(MockFetcher::new(), MockSearchProvider::new());
        let err = fx
            .harvester(ExhaustionPolicy::ProceedDirect, Arc::new(FailingStore::on_init()))
            .run(&fx.ctx, HarvestRequest::urls(["https://a.example/"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Storage(_)));
    }
}
