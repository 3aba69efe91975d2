//! LLM-backed pipeline steps

pub mod analytics;
pub mod knowledge_agent;
pub mod moderator;
pub mod router;
pub mod structured;
pub mod summarizer;
pub mod support_agent;

pub use analytics::{AnalyticsEvaluator, AnalyticsInput, FeedbackType, ResolutionAnalytics, ResponseTime};
pub use knowledge_agent::{KnowledgeAgent, KnowledgeEvaluation, KnowledgeReview, KnowledgeUpdate, RelevantArticle};
pub use moderator::ContentModerator;
pub use router::{Complexity, RoutingContext, RoutingDecision, TicketRouter};
pub use structured::{StepRunner, StructuredStep};
pub use summarizer::{KnowledgeSummary, SourceReference, Summarizer};
pub use support_agent::{NextAction, SupportAgent, SupportRequest, SupportResponse};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::StepRunner;
    use crate::llm::{ChatModel, ChatRequest};

    /// Chat model that replays one canned reply and records prompts.
    pub struct CannedChat {
        reply: String,
        pub prompts: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for CannedChat {
        async fn complete(&self, request: ChatRequest) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    pub fn runner(reply: &str) -> (StepRunner, Arc<CannedChat>) {
        let chat = Arc::new(CannedChat {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        (StepRunner::new(chat.clone(), Duration::from_secs(5)), chat)
    }
}
