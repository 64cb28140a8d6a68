//! Crawl orchestration.
//!
//! URLs are queued on a channel shared by a fixed number of workers. Each
//! worker fetches (with per-URL retries and proxy rotation), extracts and
//! upserts one URL at a time, then reports the outcome on a results
//! channel. Every worker is joined before the report is built.
//!
//! Per-URL failures are stored as error records and never abort the batch.
//! Only engine failures (a panicked worker, an unusable store) fail the
//! batch, and those retry the whole batch after a fixed backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use super::report::{CrawlOutcome, CrawlReport, UrlReport};
use super::throttle::AutoThrottle;
use crate::context::HarvestContext;
use crate::error::{FetchError, FetchResult, HarvestError, Result};
use crate::extract::content::ContentExtractor;
use crate::extract::files::FileProbe;
use crate::extract::urls::domain_of;
use crate::proxy::pool::ProxySnapshot;
use crate::traits::fetcher::{FetchedPage, Fetcher};
use crate::traits::store::PageStore;
use crate::types::config::CrawlConfig;
use crate::types::page::PageRecord;

/// Batch crawler over pluggable fetcher, store and file probe.
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn PageStore>,
    probe: Arc<dyn FileProbe>,
    extractor: ContentExtractor,
    config: CrawlConfig,
}

/// State shared by the workers of one batch.
struct BatchWorker {
    ctx: HarvestContext,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn PageStore>,
    probe: Arc<dyn FileProbe>,
    extractor: ContentExtractor,
    throttle: AutoThrottle,
    proxies: ProxySnapshot,
    max_retries: u32,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn PageStore>,
        probe: Arc<dyn FileProbe>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            probe,
            extractor: ContentExtractor::new(),
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl `urls`, retrying the whole batch if the engine fails.
    ///
    /// `max_retries` is the number of extra attempts per URL on transient
    /// failures. Returns `HarvestError::Batch` once every batch attempt
    /// has failed.
    pub async fn crawl(
        &self,
        ctx: &HarvestContext,
        urls: &[String],
        proxies: &ProxySnapshot,
        max_retries: u32,
    ) -> Result<CrawlReport> {
        let attempts = self.config.batch_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!(attempt, urls = urls.len(), proxies = proxies.len(), "Starting crawl batch");

            match self.run_batch(ctx, urls, proxies, max_retries).await {
                Ok(mut report) => {
                    report.batch_attempts = attempt;
                    info!(
                        attempted = report.attempted(),
                        succeeded = report.succeeded(),
                        failed = report.failed(),
                        persist_failures = report.persist_failures(),
                        cancelled = report.cancelled,
                        "Crawl batch finished"
                    );
                    return Ok(report);
                }
                Err(e) => {
                    error!(attempt, error = %e, "Crawl batch failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = ctx.cancel_token().cancelled() => return Err(HarvestError::Cancelled),
                    _ = tokio::time::sleep(self.config.batch_backoff()) => {}
                }
            }
        }

        Err(HarvestError::Batch {
            attempts,
            reason: last_error,
        })
    }

    /// One attempt at the whole batch.
    async fn run_batch(
        &self,
        ctx: &HarvestContext,
        urls: &[String],
        proxies: &ProxySnapshot,
        max_retries: u32,
    ) -> Result<CrawlReport> {
        self.store
            .init()
            .await
            .map_err(|e| HarvestError::Engine(format!("store init failed: {}", e)))?;

        let mut seen = HashSet::new();
        let jobs: Vec<String> = urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();

        if jobs.is_empty() {
            return Ok(CrawlReport {
                cancelled: ctx.is_cancelled(),
                ..Default::default()
            });
        }

        let (job_tx, job_rx) = mpsc::channel::<String>(jobs.len());
        let (result_tx, mut result_rx) = mpsc::channel::<UrlReport>(jobs.len());
        let worker_count = self.config.global_concurrency.max(1).min(jobs.len());

        for url in jobs {
            job_tx
                .send(url)
                .await
                .map_err(|e| HarvestError::Engine(format!("job queue closed: {}", e)))?;
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let worker = Arc::new(BatchWorker {
            ctx: ctx.clone(),
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            probe: self.probe.clone(),
            extractor: self.extractor,
            throttle: AutoThrottle::new(&self.config),
            proxies: proxies.clone(),
            max_retries,
        });

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let worker = worker.clone();

            workers.spawn(
                async move {
                    loop {
                        let next = job_rx.lock().await.recv().await;
                        let Some(url) = next else { break };

                        let report = worker.process(&url).await;
                        if result_tx.send(report).await.is_err() {
                            break;
                        }
                    }
                    debug!(worker = id, "Crawl worker finished");
                }
                .instrument(ctx.span().clone()),
            );
        }
        drop(result_tx);

        let mut engine_error = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Crawl worker failed");
                engine_error.get_or_insert_with(|| format!("worker failed: {}", e));
            }
        }

        if let Some(reason) = engine_error {
            return Err(HarvestError::Engine(reason));
        }

        let mut report = CrawlReport::default();
        while let Some(entry) = result_rx.recv().await {
            report.urls.push(entry);
        }
        report.cancelled = ctx.is_cancelled();
        Ok(report)
    }
}

impl BatchWorker {
    async fn process(&self, url: &str) -> UrlReport {
        if self.ctx.is_cancelled() {
            debug!(url = %url, "Skipping URL, crawl cancelled");
            return UrlReport {
                url: url.to_string(),
                proxy: None,
                attempts: 0,
                outcome: CrawlOutcome::Skipped,
                persisted: false,
            };
        }

        let span = tracing::info_span!("crawl_url", url = %url);
        async {
            let domain = domain_of(url).unwrap_or_default();
            let mut proxy = self.proxies.choose(url, None);
            let mut attempts = 0u32;

            let fetched = loop {
                attempts += 1;

                // Latency is timed from admission so the politeness wait is not counted.
                let result = match self.throttle.admit(&domain).await {
                    Ok(_permit) => {
                        let started = Instant::now();
                        let result = self
                            .fetcher
                            .fetch(url, proxy.as_ref())
                            .await
                            .and_then(check_response);
                        self.throttle.observe(&domain, started.elapsed(), result.is_ok());
                        result
                    }
                    Err(e) => Err(FetchError::Connection(e.to_string())),
                };

                match result {
                    Ok(page) => break Ok(page),
                    Err(e)
                        if e.is_transient()
                            && attempts <= self.max_retries
                            && !self.ctx.is_cancelled() =>
                    {
                        warn!(
                            attempt = attempts,
                            proxy = ?proxy.as_ref().map(|p| p.to_string()),
                            error = %e,
                            "Transient fetch failure, retrying"
                        );
                        proxy = self.proxies.choose(url, proxy.as_ref());
                    }
                    Err(e) => break Err(e),
                }
            };

            let (record, outcome) = match fetched {
                Ok(page) => self.build_record(url, &page).await,
                Err(e) => {
                    error!(attempts, error = %e, "Failed to fetch URL");
                    (PageRecord::error(url, &e), CrawlOutcome::failed(&e))
                }
            };

            let persisted = match self.store.upsert(&record).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Failed to store page");
                    false
                }
            };

            UrlReport {
                url: url.to_string(),
                proxy,
                attempts,
                outcome,
                persisted,
            }
        }
        .instrument(span)
        .await
    }

    async fn build_record(&self, url: &str, page: &FetchedPage) -> (PageRecord, CrawlOutcome) {
        let mut record = match self
            .extractor
            .extract_with_files(&page.url, &page.body, self.probe.as_ref())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Failed to parse page");
                return (PageRecord::error(url, &e), CrawlOutcome::failed(&e));
            }
        };
        record.url = url.to_string();

        let summary = record.summary();
        info!(
            title = %record.title,
            images = summary.images,
            videos = summary.videos,
            links = summary.links,
            files = summary.files,
            content_length = summary.content_length,
            "Scraped page"
        );

        let outcome = CrawlOutcome::Success {
            title: record.title.clone(),
            summary,
        };
        (record, outcome)
    }
}

/// Reject responses that are not a non-empty 200 HTML document.
fn check_response(page: FetchedPage) -> FetchResult<FetchedPage> {
    if page.status != 200 {
        return Err(FetchError::Status {
            status: page.status,
        });
    }
    if page.body.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    if !page.is_html() {
        return Err(FetchError::NonHtml {
            content_type: page.content_type.to_ascii_lowercase(),
        });
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{FailingStore, MockFetcher, MockFileProbe};
    use crate::types::config::ProxySchemePolicy;
    use crate::types::proxy::ProxyAddress;
    use std::time::Duration;

    fn config() -> CrawlConfig {
        CrawlConfig::default()
            .without_delays()
            .with_batch_retries(2, 0)
    }

    fn crawler(fetcher: MockFetcher, store: Arc<dyn PageStore>) -> Crawler {
        Crawler::new(Arc::new(fetcher), store, Arc::new(MockFileProbe::new()), config())
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_check_response() {
        let ok = FetchedPage::html("https://a.example", "<p>x</p>");
        assert!(check_response(ok.clone()).is_ok());
        assert_eq!(
            check_response(ok.clone().with_status(404)).unwrap_err(),
            FetchError::Status { status: 404 }
        );
        assert_eq!(
            check_response(FetchedPage::html("https://a.example", "")).unwrap_err(),
            FetchError::EmptyBody
        );
        assert!(matches!(
            check_response(ok.with_content_type("application/json")).unwrap_err(),
            FetchError::NonHtml { .. }
        ));
    }

    #[tokio::test]
    async fn test_fast_responses_narrow_the_domain_delay() {
        let config = CrawlConfig {
            download_delay_ms: 0,
            autothrottle_start_ms: 400,
            autothrottle_max_ms: 5000,
            ..CrawlConfig::default().with_concurrency(1, 1)
        };
        let pages: Vec<String> = (0..8).map(|i| format!("https://a.example/{}", i)).collect();
        let fetcher = pages.iter().fold(MockFetcher::new(), |fetcher, url| {
            fetcher.with_page(url, "<html><head><title>A</title></head><body>x</body></html>")
        });
        let worker = BatchWorker {
            ctx: HarvestContext::default(),
            fetcher: Arc::new(fetcher),
            store: Arc::new(MemoryStore::new()),
            probe: Arc::new(MockFileProbe::new()),
            extractor: ContentExtractor::new(),
            throttle: AutoThrottle::new(&config),
            proxies: ProxySnapshot::empty(),
            max_retries: 0,
        };

        for url in &pages {
            assert!(worker.process(url).await.outcome.is_success());
        }

        // Each near-instant response halves the delay; counting the wait would hold it up.
        let delay = worker.throttle.current_delay("a.example");
        assert!(delay < Duration::from_millis(10), "delay stayed at {:?}", delay);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let fetcher = MockFetcher::new()
            .with_page(
                "https://a.example/",
                "<html><head><title>A</title></head><body>Alpha</body></html>",
            )
            .with_error(
                "https://b.example/",
                FetchError::Dns {
                    host: "b.example".into(),
                },
            );
        let store = Arc::new(MemoryStore::new());
        let ctx = HarvestContext::default();

        let report = crawler(fetcher, store.clone())
            .crawl(
                &ctx,
                &urls(&["https://a.example/", "https://b.example/"]),
                &ProxySnapshot::empty(),
                3,
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.is_complete());

        let b = store.get("https://b.example/").await.unwrap().unwrap();
        assert_eq!(b.title, "Error");
        assert_eq!(b.body_content, "Failed: DNS lookup failed for b.example");
        let a = store.get("https://a.example/").await.unwrap().unwrap();
        assert_eq!(a.title, "A");
    }

    #[tokio::test]
    async fn test_transient_status_retries_with_fresh_proxy() {
        let fetcher = MockFetcher::new().with_sequence(
            "http://a.example/",
            vec![
                Ok(FetchedPage::html("http://a.example/", "busy").with_status(503)),
                Ok(FetchedPage::html("http://a.example/", "<title>A</title>")),
            ],
        );
        let proxies = ProxySnapshot::from_addresses(
            [ProxyAddress::new("1.1.1.1", 80), ProxyAddress::new("2.2.2.2", 80)],
            ProxySchemePolicy::Any,
        );
        let ctx = HarvestContext::default();

        let report = crawler(fetcher.clone(), Arc::new(MemoryStore::new()))
            .crawl(&ctx, &urls(&["http://a.example/"]), &proxies, 3)
            .await
            .unwrap();

        let entry = report.get("http://a.example/").unwrap();
        assert!(entry.outcome.is_success());
        assert_eq!(entry.attempts, 2);

        let used: Vec<_> = fetcher.calls().into_iter().map(|(_, proxy)| proxy).collect();
        assert_eq!(used.len(), 2);
        assert!(used[0].is_some() && used[1].is_some());
        assert_ne!(used[0], used[1]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let fetcher = MockFetcher::new().with_error(
            "https://a.example/",
            FetchError::Timeout {
                url: "https://a.example/".into(),
            },
        );
        let store = Arc::new(MemoryStore::new());
        let ctx = HarvestContext::default();

        let report = crawler(fetcher.clone(), store.clone())
            .crawl(&ctx, &urls(&["https://a.example/"]), &ProxySnapshot::empty(), 2)
            .await
            .unwrap();

        assert_eq!(fetcher.calls_for("https://a.example/"), 3);
        assert_eq!(report.get("https://a.example/").unwrap().attempts, 3);
        assert!(store.get("https://a.example/").await.unwrap().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_non_transient_status_is_not_retried() {
        let fetcher = MockFetcher::new().with_response(
            "https://a.example/",
            FetchedPage::html("https://a.example/", "gone").with_status(404),
        );
        let ctx = HarvestContext::default();

        let report = crawler(fetcher.clone(), Arc::new(MemoryStore::new()))
            .crawl(&ctx, &urls(&["https://a.example/"]), &ProxySnapshot::empty(), 3)
            .await
            .unwrap();

        assert_eq!(fetcher.calls_for("https://a.example/"), 1);
        assert!(matches!(
            report.get("https://a.example/").unwrap().outcome,
            CrawlOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_redirected_page_keyed_by_requested_url() {
        let fetcher = MockFetcher::new().with_response(
            "https://a.example/old",
            FetchedPage::html(
                "https://a.example/new/",
                r#"<title>Moved</title><a href="next">Next</a>"#,
            ),
        );
        let store = Arc::new(MemoryStore::new());
        let ctx = HarvestContext::default();

        crawler(fetcher, store.clone())
            .crawl(&ctx, &urls(&["https://a.example/old"]), &ProxySnapshot::empty(), 0)
            .await
            .unwrap();

        let record = store.get("https://a.example/old").await.unwrap().unwrap();
        assert_eq!(record.title, "Moved");
        assert_eq!(record.links[0].url, "https://a.example/new/next");
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let ctx = HarvestContext::default();

        let report = crawler(fetcher, Arc::new(FailingStore::on_upsert()))
            .crawl(&ctx, &urls(&["https://a.example/"]), &ProxySnapshot::empty(), 0)
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.persist_failures(), 1);
    }

    #[tokio::test]
    async fn test_store_init_failure_exhausts_batch_retries() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let ctx = HarvestContext::default();

        let err = crawler(fetcher.clone(), Arc::new(FailingStore::on_init()))
            .crawl(&ctx, &urls(&["https://a.example/"]), &ProxySnapshot::empty(), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::Batch { attempts: 2, .. }));
        assert_eq!(fetcher.calls_for("https://a.example/"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let ctx = HarvestContext::default();
        ctx.cancel();

        let report = crawler(fetcher.clone(), Arc::new(MemoryStore::new()))
            .crawl(
                &ctx,
                &urls(&["https://a.example/", "https://b.example/"]),
                &ProxySnapshot::empty(),
                0,
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.urls.len(), 2);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_urls_fetched_once() {
        let fetcher = MockFetcher::new().with_page("https://a.example/", "<title>A</title>");
        let ctx = HarvestContext::default();

        let report = crawler(fetcher.clone(), Arc::new(MemoryStore::new()))
            .crawl(
                &ctx,
                &urls(&["https://a.example/", " https://a.example/ "]),
                &ProxySnapshot::empty(),
                0,
            )
            .await
            .unwrap();

        assert_eq!(report.urls.len(), 1);
        assert_eq!(fetcher.calls_for("https://a.example/"), 1);
    }
}
