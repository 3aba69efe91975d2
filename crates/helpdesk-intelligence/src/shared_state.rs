//! State shared by the HTTP handlers

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::helpdesk_db::{DatabaseOptions, HelpdeskDatabase};
use crate::llm::{DocumentParser, HttpDocumentParser, LlmWorker};
use crate::pipeline::{PipelineDeps, TicketPipeline};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<HelpdeskDatabase>,
    pub pipeline: Arc<TicketPipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: TicketPipeline) -> Self {
        Self {
            config: Arc::new(config),
            database: pipeline.database().clone(),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Open the database and wire HTTP-backed providers from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let database = Arc::new(HelpdeskDatabase::new(
            Path::new(&config.database_path),
            &DatabaseOptions {
                pool_size: config.db_pool_size,
                busy_timeout: std::time::Duration::from_millis(config.db_busy_timeout_ms),
            },
        )?);

        let worker = Arc::new(LlmWorker::from_config(&config));
        let document_parser = config.document_parser_url.as_ref().map(|url| {
            info!("Attachment extraction via {}", url);
            Arc::new(HttpDocumentParser::new(
                url.clone(),
                config.document_parser_api_key.clone(),
                config.step_timeout(),
            )) as Arc<dyn DocumentParser>
        });

        let pipeline = TicketPipeline::new(
            PipelineDeps {
                database,
                chat: worker.clone(),
                embeddings: worker.clone(),
                moderation: worker,
                document_parser,
            },
            config.pipeline_config(),
        )?;
        Ok(Self::new(config, pipeline))
    }
}
