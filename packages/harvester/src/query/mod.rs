//! Relevance-ranked queries over the stored corpus.

pub mod audit;
pub mod engine;
pub mod terms;

pub use audit::AuditLog;
pub use engine::{rank, QueryEngine};
pub use terms::main_words;
