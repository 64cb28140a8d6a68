//! Crawl engine - bounded workers fetching, extracting and persisting pages.

pub mod fetcher;
pub mod orchestrator;
pub mod report;
pub mod throttle;

pub use fetcher::HttpFetcher;
pub use orchestrator::Crawler;
pub use report::{CrawlOutcome, CrawlReport, UrlReport};
pub use throttle::AutoThrottle;
