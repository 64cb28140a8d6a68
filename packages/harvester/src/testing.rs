//! Testing utilities including mock implementations.
//!
//! These let applications and tests drive the pipeline without network
//! access: scripted fetches, canned HEAD results, fake proxy checks and a
//! store that fails on demand.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{
    FetchError, FetchResult, ProxyError, ProxyResult, Result, StorageError, StorageResult,
};
use crate::extract::files::FileProbe;
use crate::proxy::validator::{Probe, ProxyChecker};
use crate::traits::{
    fetcher::{FetchedPage, Fetcher},
    proxy_source::ProxySource,
    searcher::SearchProvider,
    store::PageStore,
};
use crate::types::page::PageRecord;
use crate::types::proxy::ProxyAddress;

/// A mock fetcher with scripted responses per URL.
///
/// Each URL holds a sequence of results; calls consume the sequence in
/// order and the last entry repeats. Unknown URLs fail with a DNS error.
#[derive(Default, Clone)]
pub struct MockFetcher {
    scripts: Arc<RwLock<HashMap<String, Vec<FetchResult<FetchedPage>>>>>,
    cursors: Arc<RwLock<HashMap<String, usize>>>,
    panics: Arc<RwLock<HashSet<String>>>,
    latency: Duration,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<(String, Option<ProxyAddress>)>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` as a 200 text/html page.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let page = FetchedPage::html(url.clone(), html);
        self.with_sequence(url, vec![Ok(page)])
    }

    /// Serve a fixed response.
    pub fn with_response(self, url: impl Into<String>, page: FetchedPage) -> Self {
        self.with_sequence(url, vec![Ok(page)])
    }

    /// Fail every fetch of `url`.
    pub fn with_error(self, url: impl Into<String>, error: FetchError) -> Self {
        self.with_sequence(url, vec![Err(error)])
    }

    /// Serve `results` in order, repeating the last one.
    pub fn with_sequence(
        self,
        url: impl Into<String>,
        results: Vec<FetchResult<FetchedPage>>,
    ) -> Self {
        self.scripts.write().unwrap().insert(url.into(), results);
        self
    }

    /// Panic on the next fetch of `url`, then behave normally.
    pub fn panic_once(self, url: impl Into<String>) -> Self {
        self.panics.write().unwrap().insert(url.into());
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every fetch made, with the proxy it used.
    pub fn calls(&self) -> Vec<(String, Option<ProxyAddress>)> {
        self.calls.read().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&ProxyAddress>) -> FetchResult<FetchedPage> {
        self.calls
            .write()
            .unwrap()
            .push((url.to_string(), proxy.cloned()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let should_panic = self.panics.write().unwrap().remove(url);
        if should_panic {
            panic!("scripted fetch panic for {}", url);
        }

        let scripts = self.scripts.read().unwrap();
        let Some(script) = scripts.get(url).filter(|s| !s.is_empty()) else {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string());
            return Err(FetchError::Dns { host });
        };

        let mut cursors = self.cursors.write().unwrap();
        let cursor = cursors.entry(url.to_string()).or_insert(0);
        let result = script[(*cursor).min(script.len() - 1)].clone();
        *cursor += 1;
        result
    }
}

/// A mock HEAD probe with canned content types.
#[derive(Default, Clone)]
pub struct MockFileProbe {
    types: Arc<RwLock<HashMap<String, String>>>,
    probed: Arc<RwLock<Vec<String>>>,
}

impl MockFileProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `content_type` for `url`. Unknown URLs fail.
    pub fn with_type(self, url: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.types.write().unwrap().insert(url.into(), content_type.into());
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.read().unwrap().clone()
    }
}

#[async_trait]
impl FileProbe for MockFileProbe {
    async fn content_type(&self, url: &str) -> FetchResult<String> {
        self.probed.write().unwrap().push(url.to_string());
        self.types
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Connection(format!("no route to {}", url)))
    }
}

/// A mock proxy checker: listed proxies work, everything else fails.
#[derive(Default, Clone)]
pub struct MockProxyChecker {
    working: Arc<RwLock<HashMap<ProxyAddress, f64>>>,
    panicking: Arc<RwLock<HashSet<ProxyAddress>>>,
    checks: Arc<RwLock<Vec<ProxyAddress>>>,
}

impl MockProxyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a proxy as working with the given latency.
    ///
    /// Panics on a malformed address; this is test setup.
    pub fn with_working(self, address: &str, latency_ms: f64) -> Self {
        let address: ProxyAddress = address.parse().unwrap();
        self.working.write().unwrap().insert(address, latency_ms);
        self
    }

    /// Make checks of this proxy panic.
    pub fn with_panicking(self, address: &str) -> Self {
        let address: ProxyAddress = address.parse().unwrap();
        self.panicking.write().unwrap().insert(address);
        self
    }

    pub fn checks_for(&self, address: &ProxyAddress) -> usize {
        self.checks.read().unwrap().iter().filter(|a| *a == address).count()
    }

    pub fn total_checks(&self) -> usize {
        self.checks.read().unwrap().len()
    }
}

#[async_trait]
impl ProxyChecker for MockProxyChecker {
    async fn check(&self, proxy: &ProxyAddress, endpoint: &str) -> ProxyResult<Probe> {
        self.checks.write().unwrap().push(proxy.clone());

        let should_panic = self.panicking.read().unwrap().contains(proxy);
        if should_panic {
            panic!("scripted proxy check panic for {}", proxy);
        }

        match self.working.read().unwrap().get(proxy) {
            Some(latency_ms) => Ok(Probe {
                latency_ms: *latency_ms,
                origin: proxy.host().to_string(),
            }),
            None => Err(ProxyError::Check(format!("{} unreachable via {}", endpoint, proxy))),
        }
    }
}

/// A proxy source returning a fixed list.
#[derive(Default, Clone)]
pub struct StaticProxySource {
    candidates: Vec<ProxyAddress>,
    fail: bool,
    requests: Arc<RwLock<Vec<usize>>>,
}

impl StaticProxySource {
    pub fn new(candidates: Vec<ProxyAddress>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    /// A source whose every request fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Limits passed to each `candidates` call.
    pub fn requests(&self) -> Vec<usize> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn candidates(&self, limit: usize) -> ProxyResult<Vec<ProxyAddress>> {
        self.requests.write().unwrap().push(limit);
        if self.fail {
            return Err(ProxyError::Source("scripted source failure".to_string()));
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

/// A mock search provider with canned results per query.
#[derive(Default, Clone)]
pub struct MockSearchProvider {
    results: Arc<RwLock<HashMap<String, Vec<String>>>>,
    queries: Arc<RwLock<Vec<String>>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, query: impl Into<String>, urls: Vec<&str>) -> Self {
        self.results
            .write()
            .unwrap()
            .insert(query.into(), urls.into_iter().map(str::to_string).collect());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.read().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        self.queries.write().unwrap().push(query.to_string());
        let urls = self.results.read().unwrap().get(query).cloned().unwrap_or_default();
        Ok(urls.into_iter().take(limit).collect())
    }
}

/// A store that fails on init or on every write.
pub struct FailingStore {
    fail_init: bool,
}

impl FailingStore {
    /// `init` succeeds, every `upsert` fails.
    pub fn on_upsert() -> Self {
        Self { fail_init: false }
    }

    /// `init` fails.
    pub fn on_init() -> Self {
        Self { fail_init: true }
    }
}

#[async_trait]
impl PageStore for FailingStore {
    async fn init(&self) -> StorageResult<()> {
        if self.fail_init {
            return Err(StorageError::InvalidRecord {
                url: String::new(),
                reason: "scripted init failure".to_string(),
            });
        }
        Ok(())
    }

    async fn upsert(&self, page: &PageRecord) -> StorageResult<()> {
        Err(StorageError::InvalidRecord {
            url: page.url.clone(),
            reason: "scripted write failure".to_string(),
        })
    }

    async fn get(&self, _url: &str) -> StorageResult<Option<PageRecord>> {
        Ok(None)
    }

    async fn list(&self) -> StorageResult<Vec<PageRecord>> {
        Err(StorageError::InvalidRecord {
            url: String::new(),
            reason: "scripted read failure".to_string(),
        })
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(0)
    }
}
