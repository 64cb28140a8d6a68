//! reqwest-backed fetcher with per-proxy clients and browser-like headers.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult, HarvestError, Result};
use crate::traits::fetcher::{FetchedPage, Fetcher};
use crate::types::proxy::ProxyAddress;

/// Desktop browser user agents rotated across requests.
pub const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";
const REFERER: &str = "https://www.google.com/";

/// Pick a user agent at random.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// HTTP fetcher used by crawl workers.
///
/// Keeps one client for direct requests and lazily builds one client per
/// proxy, so connection pools are reused across URLs.
pub struct HttpFetcher {
    timeout: Duration,
    direct: reqwest::Client,
    proxied: Mutex<HashMap<ProxyAddress, reqwest::Client>>,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let direct = Self::client_builder(timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            timeout,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(
            reqwest::header::REFERER,
            reqwest::header::HeaderValue::from_static(REFERER),
        );

        reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
    }

    async fn client_for(&self, proxy: Option<&ProxyAddress>) -> FetchResult<reqwest::Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock().await;
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let proxy_url = proxy.as_proxy_url();
        let client = reqwest::Proxy::all(&proxy_url)
            .and_then(|p| Self::client_builder(self.timeout).proxy(p).build())
            .map_err(|e| {
                warn!(proxy = %proxy, error = %e, "Failed to build proxied client");
                FetchError::Connection(format!("invalid proxy {}: {}", proxy, e))
            })?;

        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, proxy: Option<&ProxyAddress>) -> FetchResult<FetchedPage> {
        let client = self.client_for(proxy).await?;

        debug!(url = %url, proxy = ?proxy.map(|p| p.to_string()), "HTTP fetch starting");
        let started = Instant::now();

        let response = client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                FetchError::from_reqwest(url, &e)
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let elapsed = started.elapsed();
        debug!(url = %url, status, elapsed_ms = elapsed.as_millis() as u64, "HTTP fetch finished");

        Ok(FetchedPage {
            url: final_url,
            status,
            content_type,
            body: body.to_vec(),
            elapsed,
        })
    }
}
