//! HTML extraction - turns a fetched document into a `PageRecord`.
//!
//! Parsing is synchronous (`scraper::Html` is not `Send`), so the crawl
//! worker parses first and only then awaits the HEAD checks that confirm
//! downloadable files.

pub mod content;
pub mod files;
pub mod text;
pub mod urls;

pub use content::{ContentExtractor, ExtractedPage};
pub use files::{FileProbe, HttpFileProbe};
