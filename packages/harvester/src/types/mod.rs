//! Data types shared across the crawl, proxy and query modules.

pub mod config;
pub mod page;
pub mod proxy;
pub mod query;
