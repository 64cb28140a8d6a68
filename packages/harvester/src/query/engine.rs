//! Query engine - scores stored pages against search terms.
//!
//! Relevance per term is 10 for a title hit, 5 for a meta description hit
//! and 1 for a body hit (case-insensitive substring). A page is eligible
//! only when every term hits at least one of those fields. Results are
//! ordered by relevance, most recently fetched first among ties.

use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::audit::AuditLog;
use crate::context::HarvestContext;
use crate::traits::store::PageStore;
use crate::types::config::QueryConfig;
use crate::types::page::PageRecord;
use crate::types::query::{QueryRequest, ScoredPage};

const TITLE_WEIGHT: u32 = 10;
const DESCRIPTION_WEIGHT: u32 = 5;
const BODY_WEIGHT: u32 = 1;

/// Answers `QueryRequest`s from a page store.
pub struct QueryEngine {
    store: Arc<dyn PageStore>,
    audit: Option<AuditLog>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn PageStore>, config: &QueryConfig) -> Self {
        Self {
            store,
            audit: config.audit_dir.clone().map(AuditLog::new),
        }
    }

    /// Ranked matches for `request`. Never fails: storage errors are logged
    /// and produce an empty result.
    pub async fn search(&self, _ctx: &HarvestContext, request: &QueryRequest) -> Vec<ScoredPage> {
        let pages = match self.store.list().await {
            Ok(pages) => pages,
            Err(e) => {
                error!(error = %e, "Database query error");
                return Vec::new();
            }
        };

        let results = rank(pages, request);
        info!(terms = ?request.terms, results = results.len(), "Query finished");

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&request.terms, &results).await {
                warn!(dir = %audit.dir().display(), error = %e, "Failed to write query transcript");
            }
        }

        results
    }

    /// Run several queries in order, stopping early on cancellation.
    pub async fn search_batch(
        &self,
        ctx: &HarvestContext,
        requests: &[QueryRequest],
    ) -> Vec<Vec<ScoredPage>> {
        let mut all = Vec::with_capacity(requests.len());
        for request in requests {
            if ctx.is_cancelled() {
                info!(remaining = requests.len() - all.len(), "Query batch cancelled");
                break;
            }
            all.push(self.search(ctx, request).await);
        }
        all
    }
}

/// Score, filter, sort and truncate `pages` for `request`.
pub fn rank(pages: Vec<PageRecord>, request: &QueryRequest) -> Vec<ScoredPage> {
    let terms: Vec<String> = request
        .terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut scored: Vec<ScoredPage> = pages
        .into_iter()
        .filter(|page| request.matches_content_types(page))
        .filter_map(|page| {
            let relevance = relevance(&page, &terms)?;
            Some(ScoredPage { page, relevance })
        })
        .collect();

    scored.sort_by_key(|s| (Reverse(s.relevance), Reverse(s.page.fetched_at)));

    if request.limit > 0 {
        scored.truncate(request.limit);
    }
    scored
}

/// Relevance of `page` for lowercased `terms`, or `None` when some term
/// matches no field.
pub fn relevance(page: &PageRecord, terms: &[String]) -> Option<u32> {
    let title = page.title.to_lowercase();
    let description = page.meta_description.to_lowercase();
    let body = page.body_content.to_lowercase();

    let mut total = 0;
    for term in terms {
        let mut score = 0;
        if title.contains(term.as_str()) {
            score += TITLE_WEIGHT;
        }
        if description.contains(term.as_str()) {
            score += DESCRIPTION_WEIGHT;
        }
        if body.contains(term.as_str()) {
            score += BODY_WEIGHT;
        }
        if score == 0 {
            return None;
        }
        total += score;
    }
    Some(total)
}
