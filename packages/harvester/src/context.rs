//! Explicit per-run context handed to every component entry point.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

use crate::config::HarvestConfig;

/// Configuration, cancellation and the tracing span for one run.
///
/// Cloning is cheap; clones share the same cancellation token. Cancelling
/// stops new work from starting (next URL, next proxy check, next query)
/// but never aborts a request already in flight.
#[derive(Debug, Clone)]
pub struct HarvestContext {
    config: Arc<HarvestConfig>,
    cancel: CancellationToken,
    span: Span,
    run_id: Uuid,
}

impl HarvestContext {
    pub fn new(config: HarvestConfig) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            span: tracing::info_span!("harvest", run_id = %run_id),
            run_id,
        }
    }

    /// Share an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Span that spawned workers attach to.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for HarvestContext {
    fn default() -> Self {
        Self::new(HarvestConfig::default())
    }
}
