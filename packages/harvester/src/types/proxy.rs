//! Proxy types - addresses and validation records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// A forward proxy address in `host:port` form.
///
/// Parsing accepts an optional `http://` or `https://` prefix, which is
/// stripped; the canonical form never carries a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAddress {
    host: String,
    port: u16,
}

impl ProxyAddress {
    /// Create an address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// URL handed to the HTTP client when routing through this proxy.
    pub fn as_proxy_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ProxyAddress {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = bare
            .rsplit_once(':')
            .ok_or_else(|| ProxyError::InvalidAddress(s.to_string()))?;

        if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
            return Err(ProxyError::InvalidAddress(s.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| ProxyError::InvalidAddress(s.to_string()))?;
        if port == 0 {
            return Err(ProxyError::InvalidAddress(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ProxyAddress {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProxyAddress> for String {
    fn from(value: ProxyAddress) -> Self {
        value.to_string()
    }
}

/// Outcome of validating one proxy against the reference endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Unique key
    pub address: ProxyAddress,

    /// Whether any reference endpoint answered through this proxy
    pub verified: bool,

    /// Round-trip time of the fastest successful check
    pub latency_ms: Option<f64>,

    /// Origin IP reported by the reference endpoint (informational)
    pub detected_ip: Option<String>,
}

impl ProxyRecord {
    /// A proxy that answered a reference endpoint.
    pub fn verified(
        address: ProxyAddress,
        latency_ms: f64,
        detected_ip: impl Into<String>,
    ) -> Self {
        Self {
            address,
            verified: true,
            latency_ms: Some(latency_ms),
            detected_ip: Some(detected_ip.into()),
        }
    }

    /// A proxy that failed every reference endpoint.
    pub fn unverified(address: ProxyAddress) -> Self {
        Self {
            address,
            verified: false,
            latency_ms: None,
            detected_ip: None,
        }
    }
}
