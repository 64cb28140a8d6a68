//! Configuration types for validation, pooling, crawling and querying.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Echo services used to confirm a proxy works and to observe its exit IP.
pub const DEFAULT_REFERENCE_ENDPOINTS: [&str; 2] =
    ["http://httpbin.org/ip", "https://httpbin.org/ip"];

/// Which target URLs get a proxy assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySchemePolicy {
    /// Proxy every request when proxies are available.
    #[default]
    Any,
    /// Only proxy plain `http://` targets; `https://` goes direct.
    PlainHttpOnly,
}

impl FromStr for ProxySchemePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "plain_http_only" | "http_only" => Ok(Self::PlainHttpOnly),
            other => Err(format!("unknown proxy scheme policy: {other}")),
        }
    }
}

/// What to do when a full refresh leaves no verified proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Crawl without proxies, logging a warning.
    #[default]
    ProceedDirect,
    /// Abort with `HarvestError::ProxyExhausted`.
    Fail,
}

impl FromStr for ExhaustionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "proceed_direct" => Ok(Self::ProceedDirect),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown exhaustion policy: {other}")),
        }
    }
}

/// Configuration for proxy validation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Concurrent proxy checks. Default: 10.
    pub workers: usize,

    /// Per-request timeout in seconds. Default: 10.
    pub timeout_secs: u64,

    /// Endpoints that must answer `{"origin": ...}` through the proxy
    pub reference_endpoints: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            timeout_secs: 10,
            reference_endpoints: DEFAULT_REFERENCE_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Replace the reference endpoints.
    pub fn with_endpoints(
        mut self,
        endpoints: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.reference_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for the proxy pool refresh cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Plain-text list of previously verified proxies
    pub known_good_path: PathBuf,

    /// Maximum fresh candidates requested per refill. Default: 100.
    pub candidate_limit: usize,

    /// Behaviour when no proxy survives a refill
    pub exhaustion: ExhaustionPolicy,

    /// Which targets are proxied
    pub scheme_policy: ProxySchemePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            known_good_path: PathBuf::from("database/working_proxies.txt"),
            candidate_limit: 100,
            exhaustion: ExhaustionPolicy::default(),
            scheme_policy: ProxySchemePolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(known_good_path: impl Into<PathBuf>) -> Self {
        Self {
            known_good_path: known_good_path.into(),
            ..Default::default()
        }
    }

    /// Set the candidate limit.
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Set the exhaustion policy.
    pub fn with_exhaustion(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion = policy;
        self
    }

    /// Set the scheme policy.
    pub fn with_scheme_policy(mut self, policy: ProxySchemePolicy) -> Self {
        self.scheme_policy = policy;
        self
    }
}

/// Configuration for crawl batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Concurrent fetches across all domains. Default: 8.
    pub global_concurrency: usize,

    /// Concurrent fetches per domain. Default: 4.
    pub domain_concurrency: usize,

    /// Extra attempts per URL on transient failures. Default: 3.
    pub max_retries: u32,

    /// Whole-batch attempts when the engine fails. Default: 3.
    pub batch_retries: u32,

    /// Fixed sleep between batch attempts in milliseconds. Default: 5000.
    pub batch_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Base politeness delay between requests to one domain. Default: 2000.
    pub download_delay_ms: u64,

    /// Initial autothrottle delay in milliseconds. Default: 1000.
    pub autothrottle_start_ms: u64,

    /// Ceiling for the autothrottle delay in milliseconds. Default: 5000.
    pub autothrottle_max_ms: u64,

    /// Global request rate cap; 0 = unlimited.
    pub requests_per_second: u32,

    /// HEAD timeout for downloadable file checks in seconds. Default: 5.
    pub file_check_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 8,
            domain_concurrency: 4,
            max_retries: 3,
            batch_retries: 3,
            batch_backoff_ms: 5000,
            request_timeout_secs: 30,
            download_delay_ms: 2000,
            autothrottle_start_ms: 1000,
            autothrottle_max_ms: 5000,
            requests_per_second: 0,
            file_check_timeout_secs: 5,
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set global and per-domain concurrency.
    pub fn with_concurrency(mut self, global: usize, per_domain: usize) -> Self {
        self.global_concurrency = global;
        self.domain_concurrency = per_domain;
        self
    }

    /// Set per-URL retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set whole-batch retries and their backoff.
    pub fn with_batch_retries(mut self, retries: u32, backoff_ms: u64) -> Self {
        self.batch_retries = retries;
        self.batch_backoff_ms = backoff_ms;
        self
    }

    /// Set the global request rate.
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Disable politeness delays (tests, local mirrors).
    pub fn without_delays(mut self) -> Self {
        self.download_delay_ms = 0;
        self.autothrottle_start_ms = 0;
        self.autothrottle_max_ms = 0;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_backoff(&self) -> Duration {
        Duration::from_millis(self.batch_backoff_ms)
    }

    pub fn file_check_timeout(&self) -> Duration {
        Duration::from_secs(self.file_check_timeout_secs)
    }
}

/// Configuration for the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Limit applied when a request does not set one. Default: 10.
    pub default_limit: usize,

    /// Directory for per-query audit transcripts; None disables them
    pub audit_dir: Option<PathBuf>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            audit_dir: Some(PathBuf::from("database/scraped_results")),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default limit.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the audit directory.
    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }

    /// Disable audit transcripts.
    pub fn without_audit(mut self) -> Self {
        self.audit_dir = None;
        self
    }
}
