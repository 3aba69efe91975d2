//! HTTP worker for an OpenAI-compatible backend
//!
//! Implements chat completion, embeddings and moderation against
//! `/v1/chat/completions`, `/v1/embeddings` and `/v1/moderations`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::provider::{ChatModel, ChatRequest, EmbeddingProvider, ModerationProvider, ModerationVerdict};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}

#[derive(Debug, Clone)]
pub struct LlmWorkerOptions {
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub moderation_model: String,
    pub request_timeout: Duration,
}

impl Default for LlmWorkerOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            moderation_model: "omni-moderation-latest".to_string(),
            request_timeout: Duration::from_secs(600),
        }
    }
}

pub struct LlmWorker {
    backend_url: String,
    options: LlmWorkerOptions,
    http_client: reqwest::Client,
}

impl LlmWorker {
    pub fn new_with_backend(backend_url: impl Into<String>, options: LlmWorkerOptions) -> Self {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        info!(
            "LLM worker initialized with backend: {} (chat {}, embeddings {})",
            backend_url, options.chat_model, options.embedding_model
        );
        Self {
            http_client: reqwest::Client::builder()
                .timeout(options.request_timeout)
                .build()
                .unwrap_or_default(),
            backend_url,
            options,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new_with_backend(
            config.llm_base_url.clone(),
            LlmWorkerOptions {
                api_key: config.llm_api_key.clone(),
                chat_model: config.chat_model.clone(),
                embedding_model: config.embedding_model.clone(),
                moderation_model: config.moderation_model.clone(),
                // Step deadlines are enforced by the pipeline; this only bounds stuck sockets.
                request_timeout: config.step_timeout() * 2,
            },
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.backend_url)
    }

    fn moderations_url(&self) -> String {
        format!("{}/v1/moderations", self.backend_url)
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self.http_client.post(url);
        match &self.options.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send_json<B, R>(&self, url: String, body: &B, what: &str) -> anyhow::Result<R>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{} request failed: {}", what, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("{} backend returned {}: {}", what, status, body));
        }
        response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse {} response: {}", what, e))
    }
}

#[async_trait]
impl ChatModel for LlmWorker {
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<String> {
        debug!("LLM worker completing step {}", request.step);
        let body = ChatCompletionRequest {
            model: self.options.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let completion: ChatCompletionResponse =
            self.send_json(self.completions_url(), &body, "LLM").await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("LLM backend returned no message content"))
    }
}

#[async_trait]
impl EmbeddingProvider for LlmWorker {
    fn model_name(&self) -> &str {
        &self.options.embedding_model
    }

    async fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        debug!("Generating embeddings for {} text(s)", expected);
        let request = EmbeddingRequest {
            model: self.options.embedding_model.clone(),
            input: texts,
        };
        let mut response: EmbeddingResponse =
            self.send_json(self.embeddings_url(), &request, "Embedding").await?;
        if response.data.len() != expected {
            return Err(anyhow::anyhow!(
                "Embedding backend returned {} vectors for {} inputs",
                response.data.len(),
                expected
            ));
        }
        // Providers may reorder items; `index` restores input order when present.
        if response.data.iter().all(|d| d.index.is_some()) {
            response.data.sort_by_key(|d| d.index);
        }
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl ModerationProvider for LlmWorker {
    async fn moderate(&self, text: &str) -> anyhow::Result<ModerationVerdict> {
        let request = ModerationRequest {
            model: &self.options.moderation_model,
            input: text,
        };
        let response: ModerationResponse =
            self.send_json(self.moderations_url(), &request, "Moderation").await?;
        let result = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Moderation backend returned no results"))?;

        if !result.flagged {
            return Ok(ModerationVerdict::clean());
        }
        let categories: Vec<String> = result
            .categories
            .into_iter()
            .filter(|(_, hit)| *hit)
            .map(|(name, _)| name)
            .collect();
        let reason = if categories.is_empty() {
            "Content flagged by moderation".to_string()
        } else {
            format!("Content flagged for: {}", categories.join(", "))
        };
        Ok(ModerationVerdict::flagged(reason))
    }
}
