//! Ticket intake and resolution workflows

pub mod knowledge_updater;
pub mod orchestrator;
pub mod outcome;
pub mod retriever;

pub use knowledge_updater::{AppliedUpdate, KnowledgeBaseUpdater};
pub use orchestrator::{PipelineConfig, PipelineDeps, TicketPipeline};
pub use outcome::{
    DraftedResponse, FlaggedTicket, IntakeOutcome, PipelineResult, Resolution, ResolutionOutcome,
    ResolutionReport, RoutedTicket,
};
pub use retriever::KnowledgeRetriever;
