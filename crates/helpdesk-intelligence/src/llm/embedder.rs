//! Embedding generator
//!
//! Wraps an [`EmbeddingProvider`] with a per-model text cache, an in-process
//! concurrency limit and the system-wide dimension check. Vectors are never
//! substituted: any provider failure is returned to the caller.

use futures::future::try_join_all;
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

use super::provider::EmbeddingProvider;
use crate::error::{bounded, PipelineError};
use crate::metrics;

const STEP: &str = "embedding";

#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    pub dimension: usize,
    pub max_concurrent: usize,
    pub cache_capacity: u64,
    pub timeout: Duration,
}

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Cache<[u8; 32], Arc<Vec<f32>>>,
    limiter: Arc<Semaphore>,
    dimension: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbedderOptions) -> Self {
        Self {
            provider,
            cache: Cache::new(options.cache_capacity),
            limiter: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
            dimension: options.dimension,
            timeout: options.timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn cache_key(&self, text: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.provider.model_name().as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Vector for one text, of exactly the configured dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let key = self.cache_key(text);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.as_ref().clone());
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| PipelineError::upstream(STEP, e))?;

        let started = Instant::now();
        let mut vectors = bounded(
            STEP,
            self.timeout,
            self.provider.embed_batch(vec![text.to_string()]),
        )
        .await?;
        metrics::observe_step(STEP, started.elapsed().as_secs_f64());

        if vectors.len() != 1 {
            return Err(PipelineError::contract(
                STEP,
                format!("expected 1 vector, provider returned {}", vectors.len()),
            ));
        }
        let vector = vectors.remove(0);
        if vector.len() != self.dimension {
            return Err(PipelineError::contract(
                STEP,
                format!(
                    "expected dimension {}, provider returned {}",
                    self.dimension,
                    vector.len()
                ),
            ));
        }
        metrics::add_embeddings(1);

        self.cache.insert(key, Arc::new(vector.clone())).await;
        Ok(vector)
    }

    /// Embed every text concurrently; output order matches input order.
    /// The first failure fails the whole call.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        debug!("Embedding {} chunk(s)", texts.len());
        try_join_all(texts.iter().map(|text| self.embed(text))).await
    }
}
