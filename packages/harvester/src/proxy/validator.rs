//! Concurrent proxy validation against reference echo endpoints.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::context::HarvestContext;
use crate::crawl::fetcher::random_user_agent;
use crate::error::{ProxyError, ProxyResult};
use crate::types::config::ValidatorConfig;
use crate::types::proxy::{ProxyAddress, ProxyRecord};

/// A successful check through one proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub latency_ms: f64,

    /// Origin IP the endpoint saw
    pub origin: String,
}

/// Checks one proxy against one reference endpoint.
#[async_trait]
pub trait ProxyChecker: Send + Sync {
    async fn check(&self, proxy: &ProxyAddress, endpoint: &str) -> ProxyResult<Probe>;
}

/// Checker that sends a real GET through the proxy.
///
/// Certificate errors are ignored: free proxies commonly intercept TLS and
/// the check only cares whether traffic flows.
pub struct HttpProxyChecker {
    timeout: Duration,
}

impl HttpProxyChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProxyChecker for HttpProxyChecker {
    async fn check(&self, proxy: &ProxyAddress, endpoint: &str) -> ProxyResult<Probe> {
        let client = reqwest::Proxy::all(proxy.as_proxy_url())
            .and_then(|p| {
                reqwest::Client::builder()
                    .proxy(p)
                    .timeout(self.timeout)
                    .danger_accept_invalid_certs(true)
                    .build()
            })
            .map_err(|e| ProxyError::Check(e.to_string()))?;

        let started = Instant::now();
        let response = client
            .get(endpoint)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|e| ProxyError::Check(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(ProxyError::Check(format!("status code: {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProxyError::Check(e.to_string()))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let origin = parse_origin(&body)
            .ok_or_else(|| ProxyError::Check("response has no origin field".to_string()))?;

        Ok(Probe { latency_ms, origin })
    }
}

/// Read the `origin` (or `ip`) string from an echo endpoint's JSON body.
pub fn parse_origin(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("origin")
        .or_else(|| value.get("ip"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Validates batches of proxy candidates with bounded concurrency.
pub struct ProxyValidator {
    checker: Arc<dyn ProxyChecker>,
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new(checker: Arc<dyn ProxyChecker>, config: ValidatorConfig) -> Self {
        Self { checker, config }
    }

    /// Validator backed by real HTTP checks.
    pub fn http(config: ValidatorConfig) -> Self {
        Self::new(Arc::new(HttpProxyChecker::new(config.timeout())), config)
    }

    /// Check every distinct candidate and return one record per address.
    ///
    /// All checks are joined before this returns. Cancellation stops new
    /// checks from being dispatched; checks already running finish.
    pub async fn validate(
        &self,
        ctx: &HarvestContext,
        candidates: &[ProxyAddress],
    ) -> Vec<ProxyRecord> {
        let mut seen = HashSet::new();
        let unique: Vec<ProxyAddress> = candidates
            .iter()
            .filter(|c| seen.insert((*c).clone()))
            .cloned()
            .collect();

        if unique.is_empty() {
            return Vec::new();
        }

        info!(candidates = unique.len(), workers = self.config.workers, "Validating proxies");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let endpoints: Arc<[String]> = self.config.reference_endpoints.clone().into();
        // Capacity covers every task so no sender blocks while we dispatch.
        let (tx, mut rx) = mpsc::channel::<ProxyRecord>(unique.len());
        let mut tasks = JoinSet::new();

        for address in unique {
            if ctx.is_cancelled() {
                info!("Proxy validation cancelled; not dispatching remaining candidates");
                break;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let checker = self.checker.clone();
            let endpoints = endpoints.clone();

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let record = check_candidate(checker.as_ref(), address, &endpoints).await;
                    let _ = tx.send(record).await;
                }
                .instrument(ctx.span().clone()),
            );
        }
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Proxy check task failed");
            }
        }

        let mut records = Vec::new();
        let mut reported = HashSet::new();
        while let Some(record) = rx.recv().await {
            if reported.insert(record.address.clone()) {
                records.push(record);
            }
        }

        let verified = records.iter().filter(|r| r.verified).count();
        info!(checked = records.len(), verified, "Proxy validation finished");
        records
    }

    /// Verified records only, fastest first.
    pub async fn verified(
        &self,
        ctx: &HarvestContext,
        candidates: &[ProxyAddress],
    ) -> Vec<ProxyRecord> {
        let mut verified: Vec<ProxyRecord> = self
            .validate(ctx, candidates)
            .await
            .into_iter()
            .filter(|r| r.verified)
            .collect();
        verified.sort_by(|a, b| {
            a.latency_ms
                .unwrap_or(f64::MAX)
                .total_cmp(&b.latency_ms.unwrap_or(f64::MAX))
        });
        verified
    }
}

/// Try every endpoint, keeping the fastest success.
async fn check_candidate(
    checker: &dyn ProxyChecker,
    address: ProxyAddress,
    endpoints: &[String],
) -> ProxyRecord {
    let mut best: Option<Probe> = None;

    for endpoint in endpoints {
        match checker.check(&address, endpoint).await {
            Ok(probe) => {
                debug!(
                    proxy = %address,
                    endpoint = %endpoint,
                    latency_ms = probe.latency_ms,
                    origin = %probe.origin,
                    "Proxy works"
                );
                if best.as_ref().map_or(true, |b| probe.latency_ms < b.latency_ms) {
                    best = Some(probe);
                }
            }
            Err(e) => {
                debug!(proxy = %address, endpoint = %endpoint, error = %e, "Proxy check failed");
            }
        }
    }

    match best {
        Some(probe) => ProxyRecord::verified(address, probe.latency_ms, probe.origin),
        None => ProxyRecord::unverified(address),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProxyChecker;

    fn addr(s: &str) -> ProxyAddress {
        s.parse().unwrap()
    }

    fn validator(checker: MockProxyChecker) -> ProxyValidator {
        ProxyValidator::new(Arc::new(checker), ValidatorConfig::default().with_workers(3))
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(parse_origin(r#"{"origin": "1.2.3.4"}"#).as_deref(), Some("1.2.3.4"));
        assert_eq!(parse_origin(r#"{"ip": "5.6.7.8"}"#).as_deref(), Some("5.6.7.8"));
        assert_eq!(parse_origin(r#"{"origin": 5}"#), None);
        assert_eq!(parse_origin("<html>blocked</html>"), None);
    }

    #[tokio::test]
    async fn test_verified_subset() {
        let checker = MockProxyChecker::new()
            .with_working("1.1.1.1:80", 300.0)
            .with_working("2.2.2.2:80", 100.0);
        let ctx = HarvestContext::default();

        let verified = validator(checker)
            .verified(&ctx, &[addr("1.1.1.1:80"), addr("2.2.2.2:80"), addr("3.3.3.3:80")])
            .await;

        let order: Vec<_> = verified.iter().map(|r| r.address.to_string()).collect();
        assert_eq!(order, vec!["2.2.2.2:80", "1.1.1.1:80"]);
        assert_eq!(verified[0].detected_ip.as_deref(), Some("2.2.2.2"));
    }

    #[tokio::test]
    async fn test_duplicates_checked_once() {
        let checker = MockProxyChecker::new().with_working("1.1.1.1:80", 50.0);
        let ctx = HarvestContext::default();
        let validator = validator(checker.clone());

        let records = validator
            .validate(&ctx, &[addr("1.1.1.1:80"), addr("1.1.1.1:80"), addr("http://1.1.1.1:80")])
            .await;

        assert_eq!(records.len(), 1);
        // Once per reference endpoint
        assert_eq!(checker.checks_for(&addr("1.1.1.1:80")), 2);
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let checker = MockProxyChecker::new().with_working("1.1.1.1:80", 50.0);
        let ctx = HarvestContext::default();
        let validator = validator(checker);
        let input = [addr("1.1.1.1:80"), addr("9.9.9.9:80")];

        let verdicts = |records: Vec<ProxyRecord>| -> HashSet<(ProxyAddress, bool)> {
            records.into_iter().map(|r| (r.address, r.verified)).collect()
        };

        let first = verdicts(validator.validate(&ctx, &input).await);
        let second = verdicts(validator.validate(&ctx, &input).await);
        assert_eq!(first, second);
        assert!(first.contains(&(addr("1.1.1.1:80"), true)));
        assert!(first.contains(&(addr("9.9.9.9:80"), false)));
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let checker = MockProxyChecker::new().with_working("1.1.1.1:80", 50.0);
        let ctx = HarvestContext::default();
        ctx.cancel();

        let records = validator(checker.clone()).validate(&ctx, &[addr("1.1.1.1:80")]).await;
        assert!(records.is_empty());
        assert_eq!(checker.total_checks(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let checker = MockProxyChecker::new()
            .with_working("1.1.1.1:80", 50.0)
            .with_panicking("6.6.6.6:80");
        let ctx = HarvestContext::default();

        let verified = validator(checker)
            .verified(&ctx, &[addr("6.6.6.6:80"), addr("1.1.1.1:80")])
            .await;
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].address, addr("1.1.1.1:80"));
    }
}
