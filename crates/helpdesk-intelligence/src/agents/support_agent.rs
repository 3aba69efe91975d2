//! Customer-facing reply grounded in the summarised knowledge base

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::structured::StructuredStep;
use super::summarizer::KnowledgeSummary;
use crate::helpdesk_db::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Close,
    WaitForCustomer,
    Escalate,
    FollowUp,
}

#[derive(Debug, Clone)]
pub struct SupportRequest {
    pub message: String,
    pub ticket: Ticket,
    pub knowledge: KnowledgeSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SupportResponse {
    #[validate(length(min = 1))]
    pub response: String,
    pub needs_human_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_review_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_knowledge_articles: Option<Vec<String>>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_score: f64,
    pub next_action: NextAction,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SupportAgent;

impl StructuredStep for SupportAgent {
    const NAME: &'static str = "support_agent";
    const TEMPERATURE: f32 = 0.3;
    const MAX_TOKENS: u32 = 1500;

    type Input = SupportRequest;
    type Output = SupportResponse;

    fn system_prompt(&self) -> String {
        "You are a helpful customer support agent. Answer the customer using the knowledge base \
         context; do not invent product behaviour that the context does not support. \
         Keep concrete steps, numbers and warnings exact.\n\
         Respond with a single JSON object:\n\
         - \"response\": the reply to send to the customer\n\
         - \"needs_human_review\": true if a human agent should check or take over\n\
         - \"human_review_reason\": why, when needs_human_review is true\n\
         - \"suggested_knowledge_articles\": optional array of source ids the customer may read\n\
         - \"confidence_score\": number between 0 and 1\n\
         - \"next_action\": one of \"close\", \"wait_for_customer\", \"escalate\", \"follow_up\""
            .to_string()
    }

    fn user_prompt(&self, input: &SupportRequest) -> String {
        format!(
            "Ticket: {}\nPriority: {}\nStatus: {}\n\nTicket description:\n{}\n\n\
             Knowledge base context:\n{}\n\nCustomer message:\n{}",
            input.ticket.title.trim(),
            input.ticket.priority,
            input.ticket.status,
            input.ticket.description.trim(),
            input.knowledge.as_prompt_section(),
            input.message.trim()
        )
    }
}
