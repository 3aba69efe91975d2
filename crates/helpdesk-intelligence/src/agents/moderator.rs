//! Content moderation gate run over raw ticket text before anything else

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{bounded, PipelineError};
use crate::helpdesk_db::Ticket;
use crate::llm::{ModerationProvider, ModerationVerdict};
use crate::metrics;

const STEP: &str = "moderation";
const DEFAULT_REASON: &str = "Content flagged by moderation";

pub struct ContentModerator {
    provider: Arc<dyn ModerationProvider>,
    timeout: Duration,
}

impl ContentModerator {
    pub fn new(provider: Arc<dyn ModerationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// A flagged verdict always carries a reason.
    pub async fn moderate(&self, text: &str) -> Result<ModerationVerdict, PipelineError> {
        let started = Instant::now();
        let verdict = bounded(STEP, self.timeout, self.provider.moderate(text)).await?;
        metrics::observe_step(STEP, started.elapsed().as_secs_f64());

        if !verdict.flagged {
            debug!("Moderation passed");
            return Ok(ModerationVerdict::clean());
        }
        let reason = verdict
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REASON.to_string());
        info!("Moderation flagged content: {}", reason);
        Ok(ModerationVerdict::flagged(reason))
    }

    pub async fn moderate_ticket(&self, ticket: &Ticket) -> Result<ModerationVerdict, PipelineError> {
        self.moderate(&ticket.content_text()).await
    }
}
