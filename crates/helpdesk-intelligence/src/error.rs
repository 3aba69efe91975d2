//! Pipeline error taxonomy
//!
//! Moderation flags are not errors (they are an intake outcome) and attachment
//! extraction failures never surface here. Everything else that stops a
//! workflow is one of these variants.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider, network or non-2xx failure of an external call
    #[error("{step} failed: {cause:#}")]
    Upstream {
        step: &'static str,
        cause: anyhow::Error,
    },

    #[error("{step} timed out after {seconds}s")]
    Timeout { step: &'static str, seconds: u64 },

    /// Model output did not match the expected shape, enum or range
    #[error("{step} returned output violating its contract: {detail}")]
    Contract { step: &'static str, detail: String },

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn contract(step: &'static str, detail: impl Into<String>) -> Self {
        Self::Contract {
            step,
            detail: detail.into(),
        }
    }

    pub fn upstream(step: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            step,
            cause: cause.into(),
        }
    }

    /// Re-invoking the whole workflow is safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::Timeout { .. } | Self::Store(_)
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream",
            Self::Timeout { .. } => "timeout",
            Self::Contract { .. } => "contract",
            Self::Store(_) => "store",
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Message safe to show to end users; never carries provider internals.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound { entity, id } => format!("{} {} not found", entity, id),
            Self::InvalidInput(reason) => reason.clone(),
            Self::Upstream { .. } | Self::Timeout { .. } => {
                "The AI service is temporarily unavailable. Please try again shortly.".to_string()
            }
            Self::Contract { .. } | Self::Store(_) => {
                "The ticket could not be processed. Please try again.".to_string()
            }
        }
    }
}

/// Run one external call under a deadline, classifying failures as upstream errors.
pub(crate) async fn bounded<T, F>(
    step: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(cause)) => Err(PipelineError::Upstream { step, cause }),
        Err(_) => Err(PipelineError::Timeout {
            step,
            seconds: limit.as_secs(),
        }),
    }
}
