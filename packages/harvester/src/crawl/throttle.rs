//! Per-domain politeness: concurrency caps, adaptive delays and a global
//! request rate.

use governor::{Quota, RateLimiter};
use rand::Rng;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{HarvestError, Result};
use crate::types::config::CrawlConfig;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug)]
struct DomainSlot {
    delay: Duration,
    /// Start time reserved by the most recent request to this domain
    last: Option<Instant>,
}

/// Adaptive per-domain delay plus per-domain and global request caps.
///
/// The delay for a domain starts at the larger of the configured start
/// delay and the download delay, then moves halfway toward each observed
/// latency, bounded by the download delay and the configured maximum.
/// Failed responses can widen the delay but never narrow it.
pub struct AutoThrottle {
    floor: Duration,
    start: Duration,
    max: Duration,
    domain_concurrency: usize,
    slots: Mutex<HashMap<String, DomainSlot>>,
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
    limiter: Option<Arc<DefaultRateLimiter>>,
}

impl AutoThrottle {
    pub fn new(config: &CrawlConfig) -> Self {
        let floor = Duration::from_millis(config.download_delay_ms);
        let max = Duration::from_millis(config.autothrottle_max_ms).max(floor);
        let start = Duration::from_millis(config.autothrottle_start_ms).clamp(floor, max);

        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Self {
            floor,
            start,
            max,
            domain_concurrency: config.domain_concurrency.max(1),
            slots: Mutex::new(HashMap::new()),
            permits: Mutex::new(HashMap::new()),
            limiter,
        }
    }

    /// Wait until a request to `domain` may start.
    ///
    /// The returned permit holds one of the domain's concurrency slots;
    /// drop it once the response has been read.
    pub async fn admit(&self, domain: &str) -> Result<OwnedSemaphorePermit> {
        let semaphore = {
            let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
            permits
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.domain_concurrency)))
                .clone()
        };
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| HarvestError::Engine(format!("domain limiter closed: {}", e)))?;

        let start_at = self.reserve(domain);
        tokio::time::sleep_until(start_at).await;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        Ok(permit)
    }

    /// Feed back the latency of a finished request.
    pub fn observe(&self, domain: &str, latency: Duration, ok: bool) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .entry(domain.to_string())
            .or_insert_with(|| DomainSlot {
                delay: self.start,
                last: None,
            });

        let updated = next_delay(slot.delay, latency, ok, self.floor, self.max);
        if updated != slot.delay {
            tracing::debug!(
                domain,
                from_ms = slot.delay.as_millis() as u64,
                to_ms = updated.as_millis() as u64,
                "Autothrottle adjusted delay"
            );
        }
        slot.delay = updated;
    }

    /// Current base delay for a domain.
    pub fn current_delay(&self, domain: &str) -> Duration {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .map(|slot| slot.delay)
            .unwrap_or(self.start)
    }

    /// Reserve the next start time for `domain`, spaced by a randomized delay.
    fn reserve(&self, domain: &str) -> Instant {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .entry(domain.to_string())
            .or_insert_with(|| DomainSlot {
                delay: self.start,
                last: None,
            });

        let start_at = match slot.last {
            Some(last) => (last + jitter(slot.delay)).max(now),
            None => now,
        };
        slot.last = Some(start_at);
        start_at
    }
}

/// Randomize a delay to between 0.5x and 1.5x its value.
pub fn jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.5))
}

/// Move `current` halfway toward `latency`, bounded by `floor` and `max`.
pub fn next_delay(
    current: Duration,
    latency: Duration,
    ok: bool,
    floor: Duration,
    max: Duration,
) -> Duration {
    let target = ((current + latency) / 2).clamp(floor, max.max(floor));
    if !ok && target < current {
        current
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_delay_widens_under_slow_responses() {
        assert_eq!(next_delay(ms(2000), ms(4000), true, ms(2000), ms(5000)), ms(3000));
        assert_eq!(next_delay(ms(3000), ms(20000), true, ms(2000), ms(5000)), ms(5000));
    }

    #[test]
    fn test_delay_narrows_under_fast_responses() {
        assert_eq!(next_delay(ms(4000), ms(1000), true, ms(0), ms(5000)), ms(2500));
        assert_eq!(next_delay(ms(3000), ms(10), true, ms(2000), ms(5000)), ms(2000));
    }

    #[test]
    fn test_failures_never_narrow() {
        assert_eq!(next_delay(ms(4000), ms(100), false, ms(0), ms(5000)), ms(4000));
        assert_eq!(next_delay(ms(1000), ms(3000), false, ms(0), ms(5000)), ms(2000));
    }

    #[test]
    fn test_jitter_range() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..50 {
            let d = jitter(ms(1000));
            assert!(d >= ms(500) && d <= ms(1500), "{:?}", d);
        }
    }

    #[test]
    fn test_start_delay_respects_floor() {
        let throttle = AutoThrottle::new(&CrawlConfig::default());
        assert_eq!(throttle.current_delay("a.example"), ms(2000));

        throttle.observe("a.example", ms(6000), true);
        assert_eq!(throttle.current_delay("a.example"), ms(4000));
        assert_eq!(throttle.current_delay("b.example"), ms(2000));
    }

    #[tokio::test]
    async fn test_admit_without_delays_is_immediate() {
        let throttle = AutoThrottle::new(&CrawlConfig::default().without_delays());
        let started = Instant::now();
        for _ in 0..5 {
            let _permit = throttle.admit("a.example").await.unwrap();
        }
        assert!(started.elapsed() < ms(500));
    }

    #[tokio::test]
    async fn test_domain_concurrency_cap() {
        let config = CrawlConfig::default()
            .without_delays()
            .with_concurrency(8, 2);
        let throttle = Arc::new(AutoThrottle::new(&config));

        let first = throttle.admit("a.example").await.unwrap();
        let _second = throttle.admit("a.example").await.unwrap();

        let blocked = tokio::time::timeout(ms(50), throttle.admit("a.example")).await;
        assert!(blocked.is_err());

        let other = tokio::time::timeout(ms(50), throttle.admit("b.example")).await;
        assert!(other.is_ok());

        drop(first);
        let unblocked = tokio::time::timeout(ms(50), throttle.admit("a.example")).await;
        assert!(unblocked.is_ok());
    }
}
