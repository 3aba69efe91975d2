//! Traits the pipeline depends on, so the orchestrator can be built with
//! HTTP-backed providers in production and scripted fakes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One chat-completion call. `step` names the pipeline step for logs and metrics.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub step: &'static str,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Raw assistant text for the request.
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<String>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModerationVerdict {
    pub fn clean() -> Self {
        Self {
            flagged: false,
            reason: None,
        }
    }

    pub fn flagged(reason: impl Into<String>) -> Self {
        Self {
            flagged: true,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait ModerationProvider: Send + Sync {
    async fn moderate(&self, text: &str) -> anyhow::Result<ModerationVerdict>;
}

/// Where an uploaded file's bytes live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Bytes already in memory (serialized as a JSON byte array).
    Inline(Bytes),
    /// Downloadable location, fetched before parsing.
    Url(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub source: AttachmentSource,
}

impl AttachmentRef {
    pub fn inline(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            source: AttachmentSource::Inline(bytes.into()),
        }
    }

    pub fn url(file_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            source: AttachmentSource::Url(url.into()),
        }
    }
}

/// Best-effort text extraction. Implementations never fail: every problem
/// (network, non-2xx, unparsable response, no text) is reported as `None`.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn extract(&self, attachment: &AttachmentRef) -> Option<String>;
}
