// helpdesk-intelligence/src/lib.rs

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod helpdesk_db;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod text;

// Public API exports
pub use config::Config;
pub use error::PipelineError;
pub use helpdesk_db::HelpdeskDatabase;
pub use pipeline::{
    IntakeOutcome, PipelineConfig, PipelineDeps, PipelineResult, Resolution, ResolutionOutcome,
    TicketPipeline,
};
pub use server::run_server;
