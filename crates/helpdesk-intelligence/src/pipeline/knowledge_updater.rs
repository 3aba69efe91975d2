//! Knowledge base writes: chunk, embed, then replace a source's chunk set
//!
//! Embed-and-replace for one `(source_type, source_id)` runs under a per-source
//! async lock so concurrent resolutions touching the same source apply one
//! after the other. The replacement itself is a single transaction.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agents::KnowledgeUpdate;
use crate::error::PipelineError;
use crate::helpdesk_db::{HelpdeskDatabase, KnowledgeChunk, KnowledgeChunkMetadata, KnowledgeSourceType};
use crate::llm::Embedder;
use crate::text::TextChunker;

type SourceKey = (KnowledgeSourceType, String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedUpdate {
    pub source_type: KnowledgeSourceType,
    pub source_id: String,
    pub chunk_count: usize,
    /// The source id was allocated for this update.
    pub created: bool,
}

pub struct KnowledgeBaseUpdater {
    database: Arc<HelpdeskDatabase>,
    embedder: Arc<Embedder>,
    chunker: TextChunker,
    locks: DashMap<SourceKey, Arc<Mutex<()>>>,
}

impl KnowledgeBaseUpdater {
    pub fn new(database: Arc<HelpdeskDatabase>, embedder: Arc<Embedder>, chunker: TextChunker) -> Self {
        Self {
            database,
            embedder,
            chunker,
            locks: DashMap::new(),
        }
    }

    /// Apply one knowledge-agent update; a missing `source_id` becomes a fresh UUID.
    /// Naming a source held by another organization is a contract error.
    pub async fn apply(
        &self,
        organization_id: &str,
        update: &KnowledgeUpdate,
        updated_by: &str,
        ticket_id: Option<&str>,
    ) -> Result<AppliedUpdate, PipelineError> {
        let (source_id, created) = match &update.source_id {
            Some(id) if !id.trim().is_empty() => (id.trim().to_string(), false),
            _ => (uuid::Uuid::new_v4().to_string(), true),
        };

        if !created {
            let owner = self
                .database
                .embeddings
                .knowledge_source_owner(update.source_type, &source_id)?;
            if owner.is_some_and(|owner| owner != organization_id) {
                return Err(PipelineError::contract(
                    "knowledge_agent",
                    format!(
                        "update targets {}/{} which belongs to another organization",
                        update.source_type, source_id
                    ),
                ));
            }
        }

        let chunk_count = self
            .replace_source(
                organization_id,
                update.source_type,
                &source_id,
                &update.content,
                &update.reason,
                updated_by,
                ticket_id,
            )
            .await?;

        Ok(AppliedUpdate {
            source_type: update.source_type,
            source_id,
            chunk_count,
            created,
        })
    }

    /// Replace the full content of a source. Returns the number of chunks written.
    #[allow(clippy::too_many_arguments)]
    pub async fn replace_source(
        &self,
        organization_id: &str,
        source_type: KnowledgeSourceType,
        source_id: &str,
        content: &str,
        update_reason: &str,
        updated_by: &str,
        ticket_id: Option<&str>,
    ) -> Result<usize, PipelineError> {
        let texts = self.chunker.chunk(content);
        if texts.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "knowledge content for {}/{} is empty",
                source_type, source_id
            )));
        }

        let key: SourceKey = (source_type, source_id.to_string());
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let written = {
            let _guard = lock.lock().await;
            debug!("Acquired knowledge lock for {}/{}", source_type, source_id);
            self.embed_and_replace(
                organization_id,
                source_type,
                source_id,
                texts,
                update_reason,
                updated_by,
                ticket_id,
            )
            .await
        };
        drop(lock);
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);

        let written = written?;
        info!(
            "Knowledge source {}/{} now has {} chunk(s) ({})",
            source_type, source_id, written, update_reason
        );
        Ok(written)
    }

    #[allow(clippy::too_many_arguments)]
    async fn embed_and_replace(
        &self,
        organization_id: &str,
        source_type: KnowledgeSourceType,
        source_id: &str,
        texts: Vec<String>,
        update_reason: &str,
        updated_by: &str,
        ticket_id: Option<&str>,
    ) -> Result<usize, PipelineError> {
        let vectors = self.embedder.embed_all(&texts).await?;
        let metadata = KnowledgeChunkMetadata {
            update_reason: update_reason.to_string(),
            updated_by: updated_by.to_string(),
            total_chunks: texts.len(),
            ticket_id: ticket_id.map(str::to_string),
        };
        let chunks: Vec<KnowledgeChunk> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| KnowledgeChunk {
                organization_id: organization_id.to_string(),
                source_type,
                source_id: source_id.to_string(),
                chunk_index,
                content,
                metadata: metadata.clone(),
                embedding,
                embedding_model: self.embedder.model_name().to_string(),
            })
            .collect();

        Ok(self
            .database
            .embeddings
            .replace_knowledge_source(organization_id, source_type, source_id, &chunks)?)
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}
