//! Workflow results handed back to callers. Not persisted.

use serde::{Deserialize, Serialize};

use super::knowledge_updater::AppliedUpdate;
use crate::agents::{KnowledgeEvaluation, KnowledgeSummary, ResolutionAnalytics, RoutingDecision, SupportResponse};
use crate::helpdesk_db::{NotificationType, TicketMessage};

/// Resolution text supplied by whoever closed the ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub content: String,
    pub resolved_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedTicket {
    pub ticket_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedTicket {
    pub ticket_id: String,
    pub routing: RoutingDecision,
    pub content_chunks: usize,
    pub attachment_chunks: usize,
    /// Category ids in assignment order; the first one is primary.
    pub category_ids: Vec<String>,
    pub tag_ids: Vec<String>,
    /// Suggested names with no matching category or tag in the organization.
    pub unmatched_categories: Vec<String>,
    pub unmatched_tags: Vec<String>,
    pub assigned_team_id: Option<String>,
    pub notifications: Vec<NotificationType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    Flagged(FlaggedTicket),
    Routed(RoutedTicket),
}

impl IntakeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IntakeOutcome::Flagged(_) => "flagged",
            IntakeOutcome::Routed(_) => "routed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub ticket_id: String,
    pub knowledge_summary: KnowledgeSummary,
    pub knowledge_evaluation: KnowledgeEvaluation,
    pub applied_updates: Vec<AppliedUpdate>,
    pub analytics: ResolutionAnalytics,
    pub time_to_resolve_minutes: i64,
    pub notifications: Vec<NotificationType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    KnowledgeUpdated(ResolutionReport),
    ResolvedWithoutUpdate(ResolutionReport),
}

impl ResolutionOutcome {
    pub fn report(&self) -> &ResolutionReport {
        match self {
            ResolutionOutcome::KnowledgeUpdated(report)
            | ResolutionOutcome::ResolvedWithoutUpdate(report) => report,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionOutcome::KnowledgeUpdated(_) => "knowledge_updated",
            ResolutionOutcome::ResolvedWithoutUpdate(_) => "resolved",
        }
    }
}

/// Support-agent reply stored on the ticket as an internal draft.
#[derive(Debug, Clone, Serialize)]
pub struct DraftedResponse {
    pub support: SupportResponse,
    pub knowledge_summary: KnowledgeSummary,
    pub message: TicketMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "workflow", content = "result", rename_all = "snake_case")]
pub enum PipelineResult {
    Intake(IntakeOutcome),
    Resolution(ResolutionOutcome),
}

impl From<IntakeOutcome> for PipelineResult {
    fn from(outcome: IntakeOutcome) -> Self {
        PipelineResult::Intake(outcome)
    }
}

impl From<ResolutionOutcome> for PipelineResult {
    fn from(outcome: ResolutionOutcome) -> Self {
        PipelineResult::Resolution(outcome)
    }
}
