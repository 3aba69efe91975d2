//! Post-resolution quality scoring

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::structured::StructuredStep;
use crate::helpdesk_db::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseTime {
    Fast,
    Adequate,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Automated,
    Agent,
    None,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Automated => "automated",
            FeedbackType::Agent => "agent",
            FeedbackType::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsInput {
    pub ticket: Ticket,
    pub resolution: String,
    pub time_to_resolve_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResolutionAnalytics {
    #[validate(range(min = 0.0, max = 1.0))]
    pub resolution_quality: f64,
    pub response_time: ResponseTime,
    #[validate(range(min = 0.0, max = 1.0))]
    pub complexity_score: f64,
    pub needs_feedback: bool,
    pub feedback_type: FeedbackType,
    pub learning_opportunities: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyticsEvaluator;

impl StructuredStep for AnalyticsEvaluator {
    const NAME: &'static str = "analytics";
    const TEMPERATURE: f32 = 0.0;
    const MAX_TOKENS: u32 = 800;

    type Input = AnalyticsInput;
    type Output = ResolutionAnalytics;

    fn system_prompt(&self) -> String {
        "You review resolved helpdesk tickets for quality.\n\
         Respond with a single JSON object:\n\
         - \"resolution_quality\": number between 0 and 1\n\
         - \"response_time\": one of \"fast\", \"adequate\", \"slow\" relative to the ticket priority\n\
         - \"complexity_score\": number between 0 and 1\n\
         - \"needs_feedback\": true if the customer or the agent should be asked for feedback\n\
         - \"feedback_type\": one of \"automated\", \"agent\", \"none\"\n\
         - \"learning_opportunities\": array of short improvement notes for the support team"
            .to_string()
    }

    fn user_prompt(&self, input: &AnalyticsInput) -> String {
        format!(
            "Ticket: {}\nPriority: {}\nTime to resolve: {} minutes\n\nDescription:\n{}\n\nResolution:\n{}",
            input.ticket.title.trim(),
            input.ticket.priority,
            input.time_to_resolve_minutes,
            input.ticket.description.trim(),
            input.resolution.trim()
        )
    }

    fn check(&self, _input: &AnalyticsInput, output: &ResolutionAnalytics) -> Result<(), String> {
        if output.needs_feedback && output.feedback_type == FeedbackType::None {
            return Err("needs_feedback is true but feedback_type is none".to_string());
        }
        Ok(())
    }
}
