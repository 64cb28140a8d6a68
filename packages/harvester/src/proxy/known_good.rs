//! The known-good proxy list: plain text, one `host:port` per line.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ProxyResult;
use crate::types::proxy::ProxyAddress;

/// Proxies that passed validation in a previous run.
#[derive(Debug, Clone)]
pub struct KnownGoodList {
    path: PathBuf,
}

impl KnownGoodList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the list. A missing file is an empty list; blank and malformed
    /// lines are skipped.
    pub async fn load(&self) -> ProxyResult<Vec<ProxyAddress>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Known-good proxy file not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut seen = HashSet::new();
        let mut proxies = Vec::new();
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse::<ProxyAddress>() {
                Ok(addr) => {
                    if seen.insert(addr.clone()) {
                        proxies.push(addr);
                    }
                }
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Skipping malformed proxy line"
                ),
            }
        }
        Ok(proxies)
    }

    /// Replace the whole file with `proxies`.
    pub async fn save(&self, proxies: &[ProxyAddress]) -> ProxyResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut contents = String::new();
        for proxy in proxies {
            contents.push_str(&proxy.to_string());
            contents.push('\n');
        }
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}
