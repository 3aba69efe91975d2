//! Scripted collaborators for pipeline integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpdesk_intelligence::helpdesk_db::{Category, HelpdeskDatabase, Tag, Ticket};
use helpdesk_intelligence::llm::{
    AttachmentRef, ChatModel, ChatRequest, DocumentParser, EmbeddingProvider, ModerationProvider,
    ModerationVerdict,
};
use helpdesk_intelligence::{PipelineConfig, PipelineDeps, TicketPipeline};

pub const ORG: &str = "org-1";
pub const OTHER_ORG: &str = "org-2";
pub const DIMENSION: usize = 16;

/// Replies keyed by step name; each call pops the next reply, the last one repeats.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<HashMap<&'static str, VecDeque<Result<String, String>>>>,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn reply(&self, step: &'static str, body: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(Ok(body.to_string()));
        self
    }

    pub fn fail(&self, step: &'static str, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn steps_called(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.step).collect()
    }

    pub fn prompt_for(&self, step: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.step == step)
            .map(|c| c.user.clone())
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> anyhow::Result<String> {
        let step = request.step;
        self.calls.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(step)
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for step {}", step))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted reply for step {}", step)),
        }
    }
}

/// Bag-of-words hashing into `DIMENSION` buckets plus a constant bias term,
/// so every vector is non-zero and related texts score higher.
#[derive(Default)]
pub struct KeywordEmbedding {
    pub calls: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
    /// Longest input seen, in characters.
    pub longest_input: AtomicUsize,
}

impl KeywordEmbedding {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSION];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bucket = hash.as_bytes()[0] as usize % (DIMENSION - 1);
            v[bucket] += 1.0;
        }
        v[DIMENSION - 1] = 1.0;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed_batch(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        for text in &texts {
            self.longest_input.fetch_max(text.chars().count(), Ordering::SeqCst);
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding provider unavailable");
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Flags any text containing one of `banned`.
pub struct WordModeration {
    banned: Vec<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ModerationProvider for WordModeration {
    async fn moderate(&self, text: &str) -> anyhow::Result<ModerationVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        Ok(match self.banned.iter().find(|w| lowered.contains(w.as_str())) {
            Some(word) => ModerationVerdict::flagged(format!("harassment: contains '{}'", word)),
            None => ModerationVerdict::clean(),
        })
    }
}

/// Returns canned text per file name; unknown files fail extraction.
#[derive(Default)]
pub struct CannedParser {
    texts: HashMap<String, String>,
    pub calls: AtomicUsize,
}

impl CannedParser {
    pub fn with(mut self, file_name: &str, text: &str) -> Self {
        self.texts.insert(file_name.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl DocumentParser for CannedParser {
    async fn extract(&self, attachment: &AttachmentRef) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.get(&attachment.file_name).cloned()
    }
}

pub struct Harness {
    pub pipeline: TicketPipeline,
    pub database: Arc<HelpdeskDatabase>,
    pub chat: Arc<ScriptedChat>,
    pub embeddings: Arc<KeywordEmbedding>,
    pub moderation: Arc<WordModeration>,
    pub parser: Arc<CannedParser>,
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        chunk_size: 40,
        chunk_overlap: 10,
        embedding_dimension: DIMENSION,
        similarity_threshold: 0.0,
        match_limit: 5,
        step_timeout: Duration::from_secs(5),
        embedding_concurrency: 4,
        embedding_cache_capacity: 1_000,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), CannedParser::default())
}

pub fn harness_with(config: PipelineConfig, parser: CannedParser) -> Harness {
    let database = Arc::new(HelpdeskDatabase::new_in_memory().expect("in-memory database"));
    let chat = Arc::new(ScriptedChat::default());
    let embeddings = Arc::new(KeywordEmbedding::default());
    let moderation = Arc::new(WordModeration {
        banned: vec!["disallowed".to_string()],
        calls: AtomicUsize::new(0),
    });
    let parser = Arc::new(parser);

    let pipeline = TicketPipeline::new(
        PipelineDeps {
            database: database.clone(),
            chat: chat.clone(),
            embeddings: embeddings.clone(),
            moderation: moderation.clone(),
            document_parser: Some(parser.clone()),
        },
        config,
    )
    .expect("pipeline");

    Harness {
        pipeline,
        database,
        chat,
        embeddings,
        moderation,
        parser,
    }
}

impl Harness {
    pub fn add_category(&self, org: &str, id: &str, name: &str, team_id: Option<&str>) {
        self.database
            .taxonomy
            .insert_category(&Category {
                id: id.to_string(),
                organization_id: org.to_string(),
                name: name.to_string(),
                team_id: team_id.map(str::to_string),
            })
            .expect("insert category");
    }

    pub fn add_tag(&self, org: &str, id: &str, name: &str) {
        self.database
            .taxonomy
            .insert_tag(&Tag {
                id: id.to_string(),
                organization_id: org.to_string(),
                name: name.to_string(),
            })
            .expect("insert tag");
    }

    pub fn create_ticket(&self, org: &str, title: &str, description: &str) -> Ticket {
        let ticket = Ticket::new(org, title, description);
        self.database.tickets.insert_ticket(&ticket).expect("insert ticket");
        ticket
    }

    pub fn reload(&self, ticket: &Ticket) -> Ticket {
        self.database
            .tickets
            .get_ticket(&ticket.id)
            .expect("get ticket")
            .expect("ticket exists")
    }
}

pub fn routing_reply(priority: &str, categories: &[&str], tags: &[&str]) -> String {
    serde_json::json!({
        "priority": priority,
        "suggested_categories": categories,
        "suggested_tags": tags,
        "estimated_complexity": "simple",
        "needs_human_review": false
    })
    .to_string()
}

pub fn analytics_reply(needs_feedback: bool) -> String {
    serde_json::json!({
        "resolution_quality": 0.85,
        "response_time": "fast",
        "complexity_score": 0.2,
        "needs_feedback": needs_feedback,
        "feedback_type": if needs_feedback { "automated" } else { "none" },
        "learning_opportunities": ["Link the password reset FAQ earlier"]
    })
    .to_string()
}
