// helpdesk-intelligence/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub db_pool_size: u32,
    pub db_busy_timeout_ms: u64,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub moderation_model: String,
    pub document_parser_url: Option<String>,
    pub document_parser_api_key: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub knowledge_similarity_threshold: f32,
    pub knowledge_match_limit: usize,
    pub step_timeout_seconds: u64,
    pub embedding_concurrency: usize,
    pub embedding_cache_capacity: u64,
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let config = Self {
            database_path: env::var("HELPDESK_DB_PATH")
                .unwrap_or_else(|_| "./data/helpdesk.db".into()),
            db_pool_size: parse_var("DB_POOL_SIZE", 10)?,
            db_busy_timeout_ms: parse_var("DB_BUSY_TIMEOUT_MS", 5000)?,
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into())
                .trim_end_matches('/')
                .to_string(),
            llm_api_key: optional_var("LLM_API_KEY"),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".into()),
            embedding_dimension: parse_var("EMBEDDING_DIMENSION", 1536)?,
            moderation_model: env::var("MODERATION_MODEL")
                .unwrap_or_else(|_| "omni-moderation-latest".into()),
            document_parser_url: optional_var("DOCUMENT_PARSER_URL"),
            document_parser_api_key: optional_var("DOCUMENT_PARSER_API_KEY"),
            chunk_size: parse_var("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", 200)?,
            knowledge_similarity_threshold: parse_var("KNOWLEDGE_SIMILARITY_THRESHOLD", 0.7)?,
            knowledge_match_limit: parse_var("KNOWLEDGE_MATCH_LIMIT", 5)?,
            step_timeout_seconds: parse_var("STEP_TIMEOUT_SECONDS", 60)?,
            embedding_concurrency: parse_var("EMBEDDING_CONCURRENCY", 8)?,
            embedding_cache_capacity: parse_var("EMBEDDING_CACHE_CAPACITY", 10_000)?,
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: parse_var("API_PORT", 8000)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if !(0.0..=1.0).contains(&self.knowledge_similarity_threshold) {
            anyhow::bail!(
                "KNOWLEDGE_SIMILARITY_THRESHOLD must be within [0, 1], got {}",
                self.knowledge_similarity_threshold
            );
        }
        if self.knowledge_match_limit == 0 {
            anyhow::bail!("KNOWLEDGE_MATCH_LIMIT must be at least 1");
        }
        if self.embedding_dimension == 0 {
            anyhow::bail!("EMBEDDING_DIMENSION must be at least 1");
        }
        if self.embedding_concurrency == 0 {
            anyhow::bail!("EMBEDDING_CONCURRENCY must be at least 1");
        }
        if self.step_timeout_seconds == 0 {
            anyhow::bail!("STEP_TIMEOUT_SECONDS must be at least 1");
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embedding_dimension: self.embedding_dimension,
            similarity_threshold: self.knowledge_similarity_threshold,
            match_limit: self.knowledge_match_limit,
            step_timeout: self.step_timeout(),
            embedding_concurrency: self.embedding_concurrency,
            embedding_cache_capacity: self.embedding_cache_capacity,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Database: {} (pool {})", self.database_path, self.db_pool_size);
        info!("- LLM Backend: {}", self.llm_base_url);
        info!(
            "- LLM API Key: {}",
            if self.llm_api_key.is_some() { "set" } else { "not set" }
        );
        info!("- Chat Model: {}", self.chat_model);
        info!(
            "- Embedding Model: {} (dim {})",
            self.embedding_model, self.embedding_dimension
        );
        info!("- Moderation Model: {}", self.moderation_model);
        info!(
            "- Document Parser: {}",
            self.document_parser_url.as_deref().unwrap_or("disabled")
        );
        info!("- Chunking: size {} overlap {}", self.chunk_size, self.chunk_overlap);
        info!(
            "- Knowledge Search: threshold {} limit {}",
            self.knowledge_similarity_threshold, self.knowledge_match_limit
        );
        info!("- Step Timeout: {}s", self.step_timeout_seconds);
        info!("- API: {}:{}", self.api_host, self.api_port);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}
