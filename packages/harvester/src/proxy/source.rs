//! File-backed proxy candidate source.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::error::{ProxyError, ProxyResult};
use crate::traits::proxy_source::ProxySource;
use crate::types::proxy::ProxyAddress;

static IP_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3}):(\d+)").unwrap());

/// Reads candidates from a text file maintained by an external scraper.
///
/// Lines may be bare `host:port` entries or arbitrary text with
/// `ip:port` pairs embedded in it.
#[derive(Debug, Clone)]
pub struct FileProxySource {
    path: PathBuf,
}

impl FileProxySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Pull distinct proxy addresses out of free-form text, in order.
pub fn parse_candidates(text: &str) -> Vec<ProxyAddress> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed: Vec<ProxyAddress> = match line.parse::<ProxyAddress>() {
            Ok(addr) => vec![addr],
            Err(_) => IP_PORT
                .captures_iter(line)
                .filter_map(|caps| format!("{}:{}", &caps[1], &caps[2]).parse().ok())
                .collect(),
        };

        for addr in parsed {
            if seen.insert(addr.clone()) {
                found.push(addr);
            }
        }
    }
    found
}

#[async_trait]
impl ProxySource for FileProxySource {
    async fn candidates(&self, limit: usize) -> ProxyResult<Vec<ProxyAddress>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProxyError::Source(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let mut candidates = parse_candidates(&text);
        candidates.truncate(limit);
        tracing::info!(
            path = %self.path.display(),
            count = candidates.len(),
            "Loaded proxy candidates"
        );
        Ok(candidates)
    }
}
