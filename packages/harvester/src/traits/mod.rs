//! Core trait abstractions for the harvester library.
//!
//! These traits are the seams between the pipeline and the outside world:
//! HTTP fetching, page persistence, proxy candidates and URL discovery.
//! Real implementations live in `crawl`, `stores` and `proxy`; mocks live
//! in `testing`.

pub mod fetcher;
pub mod proxy_source;
pub mod searcher;
pub mod store;
