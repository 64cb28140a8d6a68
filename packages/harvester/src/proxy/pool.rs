//! The verified proxy pool and its refresh policy.
//!
//! A refresh first re-validates the known-good list. Only when none of
//! those proxies still work does the pool fall back to fresh candidates.

use rand::seq::SliceRandom;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use super::known_good::KnownGoodList;
use super::validator::ProxyValidator;
use crate::context::HarvestContext;
use crate::error::{HarvestError, Result};
use crate::traits::proxy_source::ProxySource;
use crate::types::config::{ExhaustionPolicy, PoolConfig, ProxySchemePolicy};
use crate::types::proxy::{ProxyAddress, ProxyRecord};

/// Where a refresh is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Re-validating the stored known-good list
    UsingKnownGood,
    /// Validating fresh candidates from the proxy source
    Refilling,
}

/// How a refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This many known-good proxies still work
    KnownGood(usize),
    /// Known-good list was dead; this many fresh candidates verified
    Refilled(usize),
    /// No proxy verified at all
    Exhausted,
}

/// Immutable view of the verified set for one crawl cycle.
#[derive(Debug, Clone)]
pub struct ProxySnapshot {
    proxies: Arc<[ProxyRecord]>,
    policy: ProxySchemePolicy,
}

impl Default for ProxySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl ProxySnapshot {
    pub fn new(proxies: Arc<[ProxyRecord]>, policy: ProxySchemePolicy) -> Self {
        Self { proxies, policy }
    }

    /// No proxies: every request goes direct.
    pub fn empty() -> Self {
        Self::new(Arc::from(Vec::new()), ProxySchemePolicy::Any)
    }

    /// Snapshot of addresses treated as verified.
    pub fn from_addresses(
        addresses: impl IntoIterator<Item = ProxyAddress>,
        policy: ProxySchemePolicy,
    ) -> Self {
        let records: Vec<ProxyRecord> = addresses
            .into_iter()
            .map(|address| ProxyRecord::verified(address.clone(), 0.0, address.host()))
            .collect();
        Self::new(records.into(), policy)
    }

    pub fn proxies(&self) -> &[ProxyRecord] {
        &self.proxies
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Pick a proxy for `url`, or `None` to fetch directly.
    ///
    /// `exclude` is skipped when another proxy is available.
    pub fn choose(&self, url: &str, exclude: Option<&ProxyAddress>) -> Option<ProxyAddress> {
        if self.policy == ProxySchemePolicy::PlainHttpOnly
            && url.trim_start().to_ascii_lowercase().starts_with("https://")
        {
            return None;
        }

        let usable: Vec<&ProxyRecord> = self.proxies.iter().filter(|p| p.verified).collect();
        let preferred: Vec<&ProxyRecord> = usable
            .iter()
            .copied()
            .filter(|p| Some(&p.address) != exclude)
            .collect();
        let pool = if preferred.is_empty() { &usable } else { &preferred };

        pool.choose(&mut rand::thread_rng())
            .map(|p| p.address.clone())
    }
}

/// Verified proxy set with known-good-first refresh.
pub struct ProxyPool {
    validator: ProxyValidator,
    source: Arc<dyn ProxySource>,
    known_good: KnownGoodList,
    config: PoolConfig,
    verified: RwLock<Arc<[ProxyRecord]>>,
}

impl ProxyPool {
    pub fn new(
        validator: ProxyValidator,
        source: Arc<dyn ProxySource>,
        config: PoolConfig,
    ) -> Self {
        Self {
            validator,
            source,
            known_good: KnownGoodList::new(config.known_good_path.clone()),
            config,
            verified: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Re-validate, refilling from the source if the known-good list is dead.
    pub async fn refresh(&self, ctx: &HarvestContext) -> Result<RefreshOutcome> {
        let mut state = PoolState::UsingKnownGood;

        loop {
            match state {
                PoolState::UsingKnownGood => {
                    let known = self.known_good.load().await.unwrap_or_else(|e| {
                        warn!(error = %e, "Failed to read known-good proxies");
                        Vec::new()
                    });
                    let verified = self.validator.verified(ctx, &known).await;
                    if ctx.is_cancelled() {
                        return Err(HarvestError::Cancelled);
                    }

                    if !verified.is_empty() {
                        info!(
                            known = known.len(),
                            verified = verified.len(),
                            "Using known-good proxies"
                        );
                        let count = verified.len();
                        self.persist(&verified).await;
                        self.install(verified);
                        return Ok(RefreshOutcome::KnownGood(count));
                    }

                    info!(known = known.len(), "No known-good proxy verified, refilling");
                    state = PoolState::Refilling;
                }
                PoolState::Refilling => {
                    let candidates = self
                        .source
                        .candidates(self.config.candidate_limit)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "Proxy source failed");
                            Vec::new()
                        });
                    let verified = self.validator.verified(ctx, &candidates).await;
                    if ctx.is_cancelled() {
                        return Err(HarvestError::Cancelled);
                    }

                    if verified.is_empty() {
                        warn!(candidates = candidates.len(), "No proxy candidate verified");
                        self.install(Vec::new());
                        return Ok(RefreshOutcome::Exhausted);
                    }

                    info!(
                        candidates = candidates.len(),
                        verified = verified.len(),
                        "Refilled proxy pool"
                    );
                    let count = verified.len();
                    self.persist(&verified).await;
                    self.install(verified);
                    return Ok(RefreshOutcome::Refilled(count));
                }
            }
        }
    }

    /// Apply the exhaustion policy to a refresh outcome.
    pub fn check_exhaustion(&self, outcome: RefreshOutcome) -> Result<()> {
        if outcome != RefreshOutcome::Exhausted {
            return Ok(());
        }
        match self.config.exhaustion {
            ExhaustionPolicy::Fail => Err(HarvestError::ProxyExhausted),
            ExhaustionPolicy::ProceedDirect => {
                warn!("Proxy pool exhausted, crawling without proxies");
                Ok(())
            }
        }
    }

    /// Current verified set with the configured scheme policy.
    pub fn snapshot(&self) -> ProxySnapshot {
        let proxies = self
            .verified
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ProxySnapshot::new(proxies, self.config.scheme_policy)
    }

    fn install(&self, verified: Vec<ProxyRecord>) {
        *self.verified.write().unwrap_or_else(PoisonError::into_inner) = verified.into();
    }

    async fn persist(&self, verified: &[ProxyRecord]) {
        let addresses: Vec<ProxyAddress> = verified.iter().map(|r| r.address.clone()).collect();
        if let Err(e) = self.known_good.save(&addresses).await {
            warn!(
                path = %self.known_good.path().display(),
                error = %e,
                "Failed to save known-good proxies"
            );
        }
    }
}
