//! Decides whether a resolution should be folded back into the knowledge base

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::structured::{validate_items, StructuredStep};
use super::summarizer::KnowledgeSummary;
use crate::helpdesk_db::{KnowledgeMatch, KnowledgeSourceType, Ticket};

#[derive(Debug, Clone)]
pub struct KnowledgeReview {
    pub ticket: Ticket,
    pub resolution: String,
    pub summary: KnowledgeSummary,
    pub matches: Vec<KnowledgeMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RelevantArticle {
    pub source_type: KnowledgeSourceType,
    #[validate(length(min = 1))]
    pub source_id: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub relevance: f64,
}

/// `source_id: None` asks for a new source; the updater allocates its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct KnowledgeUpdate {
    pub source_type: KnowledgeSourceType,
    #[serde(default)]
    pub source_id: Option<String>,
    #[validate(length(min = 1))]
    pub content: String,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct KnowledgeEvaluation {
    pub relevant_articles: Vec<RelevantArticle>,
    pub new_knowledge_extracted: bool,
    #[serde(default)]
    pub knowledge_updates: Option<Vec<KnowledgeUpdate>>,
}

impl KnowledgeEvaluation {
    /// Updates to apply; empty unless new knowledge was extracted.
    pub fn updates_to_apply(&self) -> &[KnowledgeUpdate] {
        match (&self.knowledge_updates, self.new_knowledge_extracted) {
            (Some(updates), true) => updates,
            _ => &[],
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KnowledgeAgent;

impl StructuredStep for KnowledgeAgent {
    const NAME: &'static str = "knowledge_agent";
    const MAX_TOKENS: u32 = 2000;

    type Input = KnowledgeReview;
    type Output = KnowledgeEvaluation;

    fn system_prompt(&self) -> String {
        "You maintain a helpdesk knowledge base. Given a resolved ticket, its resolution and the \
         existing knowledge that matched it, decide whether the resolution contains reusable \
         knowledge that the knowledge base lacks or states incorrectly.\n\
         Respond with a single JSON object:\n\
         - \"relevant_articles\": array of {\"source_type\", \"source_id\", \"relevance\"} for existing \
         sources that apply, relevance between 0 and 1\n\
         - \"new_knowledge_extracted\": true only if the knowledge base should change\n\
         - \"knowledge_updates\": when new_knowledge_extracted is true, array of \
         {\"source_type\": \"faq\" | \"article\" | \"file\", \"source_id\": existing id to replace or omit to \
         create a new source, \"content\": the complete new text for that source, \"reason\": why}\n\
         Write content as self-contained documentation without customer names or ticket ids."
            .to_string()
    }

    fn user_prompt(&self, input: &KnowledgeReview) -> String {
        let existing = if input.matches.is_empty() {
            "(no matching sources)".to_string()
        } else {
            input
                .matches
                .iter()
                .map(|m| {
                    format!(
                        "[{} {} chunk {}] {}",
                        m.source_type,
                        m.source_id,
                        m.chunk_index,
                        m.content.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Ticket: {}\n\n{}\n\nResolution:\n{}\n\nKnowledge summary:\n{}\n\nMatching sources:\n{}",
            input.ticket.title.trim(),
            input.ticket.description.trim(),
            input.resolution.trim(),
            input.summary.as_prompt_section(),
            existing
        )
    }

    fn check(&self, _input: &KnowledgeReview, output: &KnowledgeEvaluation) -> Result<(), String> {
        validate_items("relevant_articles", &output.relevant_articles)?;
        if let Some(updates) = &output.knowledge_updates {
            validate_items("knowledge_updates", updates)?;
        }
        Ok(())
    }
}
