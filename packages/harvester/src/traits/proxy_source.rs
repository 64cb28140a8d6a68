//! Proxy candidate source trait.

use async_trait::async_trait;

use crate::error::ProxyResult;
use crate::types::proxy::ProxyAddress;

/// Supplies fresh, unverified proxy candidates.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// At most `limit` distinct candidates.
    async fn candidates(&self, limit: usize) -> ProxyResult<Vec<ProxyAddress>>;
}
