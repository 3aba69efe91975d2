//! Organization-scoped similarity search over the knowledge base

use std::sync::Arc;
use tracing::debug;

use crate::error::PipelineError;
use crate::helpdesk_db::{HelpdeskDatabase, KnowledgeMatch};

pub struct KnowledgeRetriever {
    database: Arc<HelpdeskDatabase>,
    threshold: f32,
    limit: usize,
}

impl KnowledgeRetriever {
    pub fn new(database: Arc<HelpdeskDatabase>, threshold: f32, limit: usize) -> Self {
        Self {
            database,
            threshold,
            limit,
        }
    }

    /// Matches from `organization_id` only, at or above the threshold, best first.
    /// An empty result is a normal outcome.
    pub fn search(
        &self,
        query_embedding: &[f32],
        organization_id: &str,
    ) -> Result<Vec<KnowledgeMatch>, PipelineError> {
        let matches = self.database.embeddings.search_knowledge(
            organization_id,
            query_embedding,
            self.threshold,
            self.limit,
        )?;
        debug!(
            "Knowledge search in {} returned {} match(es) (threshold {}, limit {})",
            organization_id,
            matches.len(),
            self.threshold,
            self.limit
        );
        Ok(matches)
    }
}
