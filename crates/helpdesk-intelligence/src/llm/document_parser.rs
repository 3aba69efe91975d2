//! HTTP client for the external document parsing service
//!
//! Uploads the file as multipart form data (`files` field) and expects a JSON
//! array of elements, each carrying a `text` segment. Extraction is
//! best-effort: every failure is logged, counted and reported as `None`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{AttachmentRef, AttachmentSource, DocumentParser};
use crate::metrics;

#[derive(Debug, Deserialize)]
struct ParsedElement {
    #[serde(default)]
    text: Option<String>,
}

pub struct HttpDocumentParser {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpDocumentParser {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch(&self, source: &AttachmentSource) -> anyhow::Result<Bytes> {
        match source {
            AttachmentSource::Inline(bytes) => Ok(bytes.clone()),
            AttachmentSource::Url(url) => {
                let response = self
                    .http_client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| anyhow::anyhow!("download failed: {}", e))?;
                if !response.status().is_success() {
                    anyhow::bail!("download returned {}", response.status());
                }
                Ok(response.bytes().await?)
            }
        }
    }

    async fn try_extract(&self, attachment: &AttachmentRef) -> anyhow::Result<Option<String>> {
        let bytes = self.fetch(&attachment.source).await?;
        let mut part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(attachment.file_name.clone());
        if let Some(content_type) = &attachment.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = reqwest::multipart::Form::new().part("files", part);

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("parser request failed: {}", e))?;
        if !response.status().is_success() {
            anyhow::bail!("parser returned {}", response.status());
        }
        let elements: Vec<ParsedElement> = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed parser response: {}", e))?;

        let segments: Vec<String> = elements
            .into_iter()
            .filter_map(|e| e.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if segments.is_empty() {
            return Ok(None);
        }
        Ok(Some(segments.join("\n\n")))
    }
}

#[async_trait]
impl DocumentParser for HttpDocumentParser {
    async fn extract(&self, attachment: &AttachmentRef) -> Option<String> {
        match self.try_extract(attachment).await {
            Ok(Some(text)) => {
                debug!("Extracted {} chars from {}", text.len(), attachment.file_name);
                Some(text)
            }
            Ok(None) => {
                debug!("No text found in {}", attachment.file_name);
                None
            }
            Err(e) => {
                warn!("Attachment extraction failed for {}: {:#}", attachment.file_name, e);
                metrics::inc_extraction_failure();
                None
            }
        }
    }
}
