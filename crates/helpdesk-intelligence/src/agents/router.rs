//! Ticket router: priority, category and tag suggestions, complexity and
//! the human-review signal.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::structured::StructuredStep;
use crate::helpdesk_db::{Category, Priority, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Everything the router prompt is built from, gathered per organization
/// before the call.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub title: String,
    pub description: String,
    pub category_names: Vec<String>,
    pub tag_names: Vec<String>,
}

impl RoutingContext {
    pub fn new(title: &str, description: &str, categories: &[Category], tags: &[Tag]) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            category_names: categories.iter().map(|c| c.name.clone()).collect(),
            tag_names: tags.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

/// Category and tag suggestions are names, resolved to ids by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoutingDecision {
    pub priority: Priority,
    pub suggested_categories: Vec<String>,
    pub suggested_tags: Vec<String>,
    pub estimated_complexity: Complexity,
    pub needs_human_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_review_reason: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TicketRouter;

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none configured)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

impl StructuredStep for TicketRouter {
    const NAME: &'static str = "router";
    const TEMPERATURE: f32 = 0.0;
    const MAX_TOKENS: u32 = 512;

    type Input = RoutingContext;
    type Output = RoutingDecision;

    fn system_prompt(&self) -> String {
        "You are a helpdesk triage assistant. Read the ticket and decide how it should be routed.\n\
         Respond with a single JSON object with exactly these fields:\n\
         - \"priority\": one of \"low\", \"normal\", \"high\", \"urgent\"\n\
         - \"suggested_categories\": array of category names, most relevant first, chosen only from the available categories\n\
         - \"suggested_tags\": array of tag names chosen only from the available tags\n\
         - \"estimated_complexity\": one of \"simple\", \"moderate\", \"complex\"\n\
         - \"needs_human_review\": true when an agent must look at the ticket before any automated reply\n\
         - \"human_review_reason\": short reason when needs_human_review is true, otherwise omit\n\
         Use \"urgent\" only for outages, security incidents or data loss."
            .to_string()
    }

    fn user_prompt(&self, input: &RoutingContext) -> String {
        format!(
            "Available categories:\n{}\n\nAvailable tags:\n{}\n\nTicket title: {}\n\nTicket description:\n{}",
            bullet_list(&input.category_names),
            bullet_list(&input.tag_names),
            input.title.trim(),
            input.description.trim()
        )
    }
}
