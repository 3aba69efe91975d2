//! Ticket and knowledge-base embedding storage with organization-scoped similarity search
//!
//! Chunk sets are only ever replaced whole: every replace deletes all rows of the
//! owner (ticket or knowledge source) and inserts the new set inside one
//! `BEGIN IMMEDIATE` transaction, so no stale higher-index chunks survive.
use crate::helpdesk_db::schema::*;
use crate::helpdesk_db::{get_conn, DbPool, PooledConn};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbeddingStats {
    pub ticket_chunks: usize,
    pub knowledge_chunks: usize,
    pub dimension: usize,
}

pub struct EmbeddingStore {
    pool: DbPool,
}

impl EmbeddingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<PooledConn> {
        get_conn(&self.pool)
    }

    /// Delete all chunks of a ticket, then insert `chunks`. Indices must be dense from zero.
    pub fn replace_ticket_embeddings(
        &self,
        ticket_id: &str,
        chunks: &[TicketEmbedding],
    ) -> anyhow::Result<usize> {
        for (expected, chunk) in chunks.iter().enumerate() {
            if chunk.ticket_id != ticket_id {
                anyhow::bail!("chunk for ticket {} passed to ticket {}", chunk.ticket_id, ticket_id);
            }
            if chunk.chunk_index != expected {
                anyhow::bail!(
                    "ticket {} chunk indices are not dense: expected {}, got {}",
                    ticket_id,
                    expected,
                    chunk.chunk_index
                );
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM ticket_embeddings WHERE ticket_id = ?1", [ticket_id])?;
        for chunk in chunks {
            let embedding_bytes = bincode::serialize(&chunk.embedding)?;
            tx.execute(
                "INSERT INTO ticket_embeddings
                 (ticket_id, chunk_index, chunk_kind, chunk_text, embedding, embedding_model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ticket_id,
                    chunk.chunk_index as i64,
                    chunk.chunk_kind.as_str(),
                    &chunk.chunk_text,
                    embedding_bytes,
                    &chunk.embedding_model,
                    &now,
                ],
            )?;
        }
        tx.commit()?;

        debug!(
            "Replaced ticket {} embeddings: removed {}, inserted {}",
            ticket_id,
            removed,
            chunks.len()
        );
        Ok(chunks.len())
    }

    pub fn ticket_embeddings(&self, ticket_id: &str) -> anyhow::Result<Vec<TicketEmbedding>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT ticket_id, chunk_index, chunk_kind, chunk_text, embedding, embedding_model
             FROM ticket_embeddings WHERE ticket_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt
            .query_map([ticket_id], Self::row_to_ticket_embedding)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Atomically replace the full chunk set of one knowledge source.
    ///
    /// A source belongs to exactly one organization; replacing a source that
    /// currently holds another organization's rows is refused.
    pub fn replace_knowledge_source(
        &self,
        organization_id: &str,
        source_type: KnowledgeSourceType,
        source_id: &str,
        chunks: &[KnowledgeChunk],
    ) -> anyhow::Result<usize> {
        for (expected, chunk) in chunks.iter().enumerate() {
            if chunk.source_type != source_type
                || chunk.source_id != source_id
                || chunk.organization_id != organization_id
            {
                anyhow::bail!("chunk does not belong to {}/{}", source_type, source_id);
            }
            if chunk.chunk_index != expected {
                anyhow::bail!(
                    "{}/{} chunk indices are not dense: expected {}, got {}",
                    source_type,
                    source_id,
                    expected,
                    chunk.chunk_index
                );
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT organization_id FROM knowledge_base_embeddings
                 WHERE source_type = ?1 AND source_id = ?2 LIMIT 1",
                params![source_type.as_str(), source_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner) = owner {
            if owner != organization_id {
                anyhow::bail!(
                    "{}/{} belongs to another organization",
                    source_type,
                    source_id
                );
            }
        }

        let removed = tx.execute(
            "DELETE FROM knowledge_base_embeddings WHERE source_type = ?1 AND source_id = ?2",
            params![source_type.as_str(), source_id],
        )?;
        for chunk in chunks {
            let embedding_bytes = bincode::serialize(&chunk.embedding)?;
            tx.execute(
                "INSERT INTO knowledge_base_embeddings
                 (organization_id, source_type, source_id, chunk_index, content, metadata,
                  embedding, embedding_model, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    organization_id,
                    source_type.as_str(),
                    source_id,
                    chunk.chunk_index as i64,
                    &chunk.content,
                    serde_json::to_string(&chunk.metadata)?,
                    embedding_bytes,
                    &chunk.embedding_model,
                    &now,
                ],
            )?;
        }
        tx.commit()?;

        info!(
            "Replaced knowledge source {}/{}: removed {} chunks, inserted {}",
            source_type,
            source_id,
            removed,
            chunks.len()
        );
        Ok(chunks.len())
    }

    /// Organization currently holding rows for the source, if any.
    pub fn knowledge_source_owner(
        &self,
        source_type: KnowledgeSourceType,
        source_id: &str,
    ) -> anyhow::Result<Option<String>> {
        let conn = self.get_conn()?;
        let owner = conn
            .query_row(
                "SELECT organization_id FROM knowledge_base_embeddings
                 WHERE source_type = ?1 AND source_id = ?2 LIMIT 1",
                params![source_type.as_str(), source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn knowledge_source_chunks(
        &self,
        source_type: KnowledgeSourceType,
        source_id: &str,
    ) -> anyhow::Result<Vec<KnowledgeChunk>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT organization_id, source_type, source_id, chunk_index, content, metadata,
                    embedding, embedding_model
             FROM knowledge_base_embeddings
             WHERE source_type = ?1 AND source_id = ?2 ORDER BY chunk_index",
        )?;
        let rows = stmt
            .query_map(params![source_type.as_str(), source_id], Self::row_to_knowledge_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Similarity search restricted to one organization's knowledge base.
    /// Results at or above `similarity_threshold`, best first, at most `limit`.
    pub fn search_knowledge(
        &self,
        organization_id: &str,
        query_embedding: &[f32],
        similarity_threshold: f32,
        limit: usize,
    ) -> anyhow::Result<Vec<KnowledgeMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT organization_id, source_type, source_id, chunk_index, content, metadata,
                    embedding, embedding_model
             FROM knowledge_base_embeddings WHERE organization_id = ?1",
        )?;
        let mut rows = stmt.query([organization_id])?;

        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk = Self::row_to_knowledge_chunk(row)?;
            let similarity = cosine_similarity(query_embedding, &chunk.embedding);
            if similarity >= similarity_threshold {
                matches.push(KnowledgeMatch {
                    source_type: chunk.source_type,
                    source_id: chunk.source_id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    metadata: chunk.metadata,
                    similarity,
                });
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    pub fn get_stats(&self) -> anyhow::Result<EmbeddingStats> {
        let conn = self.get_conn()?;
        let ticket_chunks: i64 =
            conn.query_row("SELECT COUNT(*) FROM ticket_embeddings", [], |row| row.get(0))?;
        let knowledge_chunks: i64 =
            conn.query_row("SELECT COUNT(*) FROM knowledge_base_embeddings", [], |row| row.get(0))?;

        let sample: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM knowledge_base_embeddings
                 UNION ALL SELECT embedding FROM ticket_embeddings LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let dimension = match sample {
            Some(bytes) => bincode::deserialize::<Vec<f32>>(&bytes)
                .map_err(|e| anyhow::anyhow!("Deserialization error: {}", e))?
                .len(),
            None => 0,
        };

        Ok(EmbeddingStats {
            ticket_chunks: ticket_chunks as usize,
            knowledge_chunks: knowledge_chunks as usize,
            dimension,
        })
    }

    fn row_to_ticket_embedding(row: &Row) -> rusqlite::Result<TicketEmbedding> {
        let chunk_index: i64 = row.get(1)?;
        let chunk_kind: String = row.get(2)?;
        let embedding_bytes: Vec<u8> = row.get(4)?;
        Ok(TicketEmbedding {
            ticket_id: row.get(0)?,
            chunk_index: chunk_index as usize,
            chunk_kind: parse_text_enum(2, &chunk_kind)?,
            chunk_text: row.get(3)?,
            embedding: decode_vector(4, &embedding_bytes)?,
            embedding_model: row.get(5)?,
        })
    }

    fn row_to_knowledge_chunk(row: &Row) -> rusqlite::Result<KnowledgeChunk> {
        let source_type: String = row.get(1)?;
        let chunk_index: i64 = row.get(3)?;
        let metadata: String = row.get(5)?;
        let embedding_bytes: Vec<u8> = row.get(6)?;
        Ok(KnowledgeChunk {
            organization_id: row.get(0)?,
            source_type: parse_text_enum(1, &source_type)?,
            source_id: row.get(2)?,
            chunk_index: chunk_index as usize,
            content: row.get(4)?,
            metadata: serde_json::from_str(&metadata).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
            embedding: decode_vector(6, &embedding_bytes)?,
            embedding_model: row.get(7)?,
        })
    }
}

fn decode_vector(idx: usize, bytes: &[u8]) -> rusqlite::Result<Vec<f32>> {
    bincode::deserialize(bytes).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Blob, e)
    })
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
