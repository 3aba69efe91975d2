//! Condenses knowledge-base matches into a summary with source attributions

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use super::structured::{validate_items, StructuredStep};
use crate::helpdesk_db::{KnowledgeMatch, KnowledgeSourceType};

lazy_static! {
    /// Numbers, versions, codes and step markers that a summary must carry over.
    static ref DETAIL_TOKEN: Regex =
        Regex::new(r"\b(?:0x[0-9A-Fa-f]+|\d+(?:[.:,/-]\d+)*%?)").expect("static regex");
}

const NO_RELEVANT_CONTENT: &str = "No relevant knowledge base content was found for this ticket.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SourceReference {
    pub source_type: KnowledgeSourceType,
    #[validate(length(min = 1))]
    pub source_id: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct KnowledgeSummary {
    #[validate(length(min = 1))]
    pub summary: String,
    pub key_points: Vec<String>,
    pub source_references: Vec<SourceReference>,
}

impl KnowledgeSummary {
    /// Stand-in used when retrieval found nothing; the model is not called.
    pub fn no_relevant_content() -> Self {
        Self {
            summary: NO_RELEVANT_CONTENT.to_string(),
            key_points: Vec::new(),
            source_references: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source_references.is_empty() && self.summary == NO_RELEVANT_CONTENT
    }

    /// Text block handed to downstream prompts.
    pub fn as_prompt_section(&self) -> String {
        let mut section = self.summary.clone();
        if !self.key_points.is_empty() {
            section.push_str("\nKey points:");
            for point in &self.key_points {
                section.push_str("\n- ");
                section.push_str(point);
            }
        }
        for reference in &self.source_references {
            section.push_str(&format!(
                "\nSource: {} {} (relevance {:.2})",
                reference.source_type, reference.source_id, reference.relevance
            ));
        }
        section
    }
}

/// Detail tokens from `matches` that appear nowhere in the summary or its key points.
pub fn missing_details(matches: &[KnowledgeMatch], summary: &KnowledgeSummary) -> Vec<String> {
    let mut produced = summary.summary.clone();
    for point in &summary.key_points {
        produced.push('\n');
        produced.push_str(point);
    }

    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    for m in matches {
        for token in DETAIL_TOKEN.find_iter(&m.content) {
            let token = token.as_str();
            if seen.insert(token.to_string()) && !produced.contains(token) {
                missing.push(token.to_string());
            }
        }
    }
    missing
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Summarizer;

impl StructuredStep for Summarizer {
    const NAME: &'static str = "summarizer";
    const MAX_TOKENS: u32 = 1500;

    type Input = [KnowledgeMatch];
    type Output = KnowledgeSummary;

    fn system_prompt(&self) -> String {
        "You condense knowledge base excerpts for support agents.\n\
         Keep every concrete technical detail: numbers, limits, version strings, error codes, \
         ordered steps and warnings must appear verbatim in the summary or key points. \
         Do not generalise procedures into vague prose.\n\
         Respond with a single JSON object:\n\
         - \"summary\": the condensed content\n\
         - \"key_points\": array of short, specific points (steps keep their order)\n\
         - \"source_references\": array of {\"source_type\", \"source_id\", \"relevance\"} for each excerpt \
         you used, copying source_type and source_id exactly, relevance between 0 and 1"
            .to_string()
    }

    fn user_prompt(&self, input: &[KnowledgeMatch]) -> String {
        input
            .iter()
            .enumerate()
            .map(|(i, m)| {
                format!(
                    "Excerpt {} (source_type: {}, source_id: {}, similarity: {:.2}):\n{}",
                    i + 1,
                    m.source_type,
                    m.source_id,
                    m.similarity,
                    m.content.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn check(&self, input: &[KnowledgeMatch], output: &KnowledgeSummary) -> Result<(), String> {
        validate_items("source_references", &output.source_references)?;
        for reference in &output.source_references {
            let known = input.iter().any(|m| {
                m.source_type == reference.source_type && m.source_id == reference.source_id
            });
            if !known {
                return Err(format!(
                    "reference to unknown source {} {}",
                    reference.source_type, reference.source_id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::runner;
    use crate::error::PipelineError;
    use crate::helpdesk_db::KnowledgeChunkMetadata;

    fn knowledge_match(source_id: &str, content: &str) -> KnowledgeMatch {
        KnowledgeMatch {
            source_type: KnowledgeSourceType::Faq,
            source_id: source_id.to_string(),
            chunk_index: 0,
            content: content.to_string(),
            metadata: KnowledgeChunkMetadata {
                update_reason: "seed".to_string(),
                updated_by: "admin".to_string(),
                total_chunks: 1,
                ticket_id: None,
            },
            similarity: 0.91,
        }
    }

    #[tokio::test]
    async fn test_summary_keeps_numeric_details() {
        let matches = vec![knowledge_match(
            "F1",
            "Password resets expire after 15 minutes. Step 2: open Settings. Error 0x80070005 means access denied.",
        )];
        let (runner, chat) = runner(
            r#"{"summary":"Reset links expire after 15 minutes; error 0x80070005 is access denied.",
                "key_points":["Step 2: open Settings"],
                "source_references":[{"source_type":"faq","source_id":"F1","relevance":0.9}]}"#,
        );

        let summary = runner.run(&Summarizer, matches.as_slice()).await.unwrap();
        assert!(missing_details(&matches, &summary).is_empty());
        assert!(chat.prompts.lock().unwrap()[0].user.contains("source_id: F1"));
    }

    #[test]
    fn test_missing_details_reports_dropped_tokens() {
        let matches = vec![knowledge_match("F1", "Limit is 25 MB per upload, retry after 30 seconds.")];
        let summary = KnowledgeSummary {
            summary: "Uploads have a size limit.".to_string(),
            key_points: vec!["Retry after 30 seconds".to_string()],
            source_references: Vec::new(),
        };
        assert_eq!(missing_details(&matches, &summary), vec!["25"]);
    }

    #[tokio::test]
    async fn test_reference_to_unknown_source_is_rejected() {
        let matches = vec![knowledge_match("F1", "content")];
        let (runner, _) = runner(
            r#"{"summary":"s","key_points":[],
                "source_references":[{"source_type":"article","source_id":"A9","relevance":0.5}]}"#,
        );
        let err = runner.run(&Summarizer, matches.as_slice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Contract { step: "summarizer", .. }));
    }

    #[tokio::test]
    async fn test_relevance_out_of_range_is_rejected() {
        let matches = vec![knowledge_match("F1", "content")];
        let (runner, _) = runner(
            r#"{"summary":"s","key_points":[],
                "source_references":[{"source_type":"faq","source_id":"F1","relevance":1.7}]}"#,
        );
        assert!(runner.run(&Summarizer, matches.as_slice()).await.is_err());
    }

    #[test]
    fn test_sentinel_is_recognised() {
        let sentinel = KnowledgeSummary::no_relevant_content();
        assert!(sentinel.is_empty());
        assert!(sentinel.as_prompt_section().starts_with("No relevant"));
    }
}
