//! Proxy handling - candidate sources, validation and the verified pool.

pub mod known_good;
pub mod pool;
pub mod source;
pub mod validator;

pub use known_good::KnownGoodList;
pub use pool::{PoolState, ProxyPool, ProxySnapshot, RefreshOutcome};
pub use source::FileProxySource;
pub use validator::{HttpProxyChecker, Probe, ProxyChecker, ProxyValidator};
