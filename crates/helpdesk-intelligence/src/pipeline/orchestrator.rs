//! Ticket pipeline orchestrator
//!
//! Intake: moderate, chunk and embed (body plus attachments), route, persist
//! categorisation, then assign a team and notify.
//! Resolution: embed the query, retrieve, summarise, evaluate knowledge,
//! update the knowledge base, score the resolution, then persist `resolved`
//! and notify. Status is written only after every model call has succeeded.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use super::knowledge_updater::KnowledgeBaseUpdater;
use super::outcome::{
    DraftedResponse, FlaggedTicket, IntakeOutcome, Resolution, ResolutionOutcome, ResolutionReport,
    RoutedTicket,
};
use super::retriever::KnowledgeRetriever;
use crate::agents::summarizer::missing_details;
use crate::agents::{
    AnalyticsEvaluator, AnalyticsInput, ContentModerator, KnowledgeAgent, KnowledgeReview,
    KnowledgeSummary, RoutingContext, StepRunner, Summarizer, SupportAgent, SupportRequest,
    TicketRouter,
};
use crate::error::PipelineError;
use crate::helpdesk_db::{
    CategoryAssignment, ChunkKind, HelpdeskDatabase, KnowledgeMatch, NewNotification,
    NotificationType, Priority, Ticket, TicketEmbedding, TicketStatus,
};
use crate::llm::embedder::EmbedderOptions;
use crate::llm::{
    AttachmentRef, ChatModel, DocumentParser, Embedder, EmbeddingProvider, ModerationProvider,
};
use crate::metrics;
use crate::text::TextChunker;

/// Author recorded on support-agent drafts.
pub const AI_AUTHOR: &str = "ai_assistant";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_dimension: usize,
    pub similarity_threshold: f32,
    pub match_limit: usize,
    pub step_timeout: Duration,
    pub embedding_concurrency: usize,
    pub embedding_cache_capacity: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_dimension: 1536,
            similarity_threshold: 0.7,
            match_limit: 5,
            step_timeout: Duration::from_secs(60),
            embedding_concurrency: 8,
            embedding_cache_capacity: 10_000,
        }
    }
}

/// External collaborators, injected so tests can substitute fakes.
#[derive(Clone)]
pub struct PipelineDeps {
    pub database: Arc<HelpdeskDatabase>,
    pub chat: Arc<dyn ChatModel>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub moderation: Arc<dyn ModerationProvider>,
    /// `None` disables attachment extraction.
    pub document_parser: Option<Arc<dyn DocumentParser>>,
}

pub struct TicketPipeline {
    database: Arc<HelpdeskDatabase>,
    moderator: ContentModerator,
    embedder: Arc<Embedder>,
    chunker: TextChunker,
    runner: StepRunner,
    retriever: KnowledgeRetriever,
    knowledge: KnowledgeBaseUpdater,
    document_parser: Option<Arc<dyn DocumentParser>>,
}

impl TicketPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> anyhow::Result<Self> {
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        if !(0.0..=1.0).contains(&config.similarity_threshold) {
            anyhow::bail!("similarity threshold must be within [0, 1]");
        }

        let embedder = Arc::new(Embedder::new(
            deps.embeddings,
            EmbedderOptions {
                dimension: config.embedding_dimension,
                max_concurrent: config.embedding_concurrency,
                cache_capacity: config.embedding_cache_capacity,
                timeout: config.step_timeout,
            },
        ));

        info!(
            "Ticket pipeline initialized (chunk {}/{}, embeddings {} dim {}, attachments {})",
            config.chunk_size,
            config.chunk_overlap,
            embedder.model_name(),
            config.embedding_dimension,
            if deps.document_parser.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            moderator: ContentModerator::new(deps.moderation, config.step_timeout),
            runner: StepRunner::new(deps.chat, config.step_timeout),
            retriever: KnowledgeRetriever::new(
                deps.database.clone(),
                config.similarity_threshold,
                config.match_limit,
            ),
            knowledge: KnowledgeBaseUpdater::new(deps.database.clone(), embedder.clone(), chunker),
            database: deps.database,
            embedder,
            chunker,
            document_parser: deps.document_parser,
        })
    }

    pub fn database(&self) -> &Arc<HelpdeskDatabase> {
        &self.database
    }

    pub fn knowledge_base(&self) -> &KnowledgeBaseUpdater {
        &self.knowledge
    }

    /// Run intake for a ticket that already exists in the store.
    pub async fn process_new_ticket(
        &self,
        ticket: &Ticket,
        attachments: &[AttachmentRef],
    ) -> Result<IntakeOutcome, PipelineError> {
        let span = info_span!("intake", ticket_id = %ticket.id);
        let result = self.intake(ticket, attachments).instrument(span).await;
        match &result {
            Ok(outcome) => metrics::inc_pipeline_run("intake", outcome.label()),
            Err(e) => {
                warn!("Intake failed for ticket {}: {} ({})", ticket.id, e, e.kind());
                metrics::inc_pipeline_run("intake", "failed");
            }
        }
        result
    }

    pub async fn process_ticket_resolution(
        &self,
        ticket_id: &str,
        resolution: &Resolution,
    ) -> Result<ResolutionOutcome, PipelineError> {
        let span = info_span!("resolution", ticket_id = %ticket_id);
        let result = self.resolve(ticket_id, resolution).instrument(span).await;
        match &result {
            Ok(outcome) => metrics::inc_pipeline_run("resolution", outcome.label()),
            Err(e) => {
                warn!("Resolution failed for ticket {}: {} ({})", ticket_id, e, e.kind());
                metrics::inc_pipeline_run("resolution", "failed");
            }
        }
        result
    }

    /// Draft a knowledge-grounded reply to `message` and store it as an internal note.
    pub async fn draft_support_response(
        &self,
        ticket_id: &str,
        message: &str,
    ) -> Result<DraftedResponse, PipelineError> {
        let span = info_span!("draft", ticket_id = %ticket_id);
        let result = self.draft(ticket_id, message).instrument(span).await;
        match &result {
            Ok(_) => metrics::inc_pipeline_run("draft", "drafted"),
            Err(e) => {
                warn!("Draft failed for ticket {}: {} ({})", ticket_id, e, e.kind());
                metrics::inc_pipeline_run("draft", "failed");
            }
        }
        result
    }

    fn load_ticket(&self, ticket_id: &str) -> Result<Ticket, PipelineError> {
        self.database
            .tickets
            .get_ticket(ticket_id)?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "ticket",
                id: ticket_id.to_string(),
            })
    }

    fn notify(
        &self,
        ticket: &Ticket,
        notification_type: NotificationType,
        title: String,
        content: String,
        sent: &mut Vec<NotificationType>,
    ) -> Result<(), PipelineError> {
        self.database
            .notifications
            .insert(&NewNotification::for_ticket(ticket, notification_type, title, content))?;
        sent.push(notification_type);
        Ok(())
    }

    async fn intake(
        &self,
        submitted: &Ticket,
        attachments: &[AttachmentRef],
    ) -> Result<IntakeOutcome, PipelineError> {
        let ticket = self.load_ticket(&submitted.id)?;
        if ticket.organization_id != submitted.organization_id {
            return Err(PipelineError::InvalidInput(format!(
                "ticket {} does not belong to organization {}",
                submitted.id, submitted.organization_id
            )));
        }
        info!("Processing new ticket {} for {}", ticket.id, ticket.organization_id);

        // Moderation gate: nothing else runs for flagged content.
        let verdict = self.moderator.moderate_ticket(&ticket).await?;
        if verdict.flagged {
            let reason = verdict.reason.unwrap_or_default();
            self.database.tickets.update_status_and_priority(
                &ticket.id,
                TicketStatus::Closed,
                Priority::Urgent,
            )?;
            let mut sent = Vec::new();
            self.notify(
                &ticket,
                NotificationType::HighPriority,
                format!("Ticket flagged by moderation: {}", ticket.title),
                reason.clone(),
                &mut sent,
            )?;
            info!("Ticket {} closed by moderation", ticket.id);
            return Ok(IntakeOutcome::Flagged(FlaggedTicket {
                ticket_id: ticket.id,
                reason,
            }));
        }

        let (content_chunks, attachment_chunks) = self.embed_ticket(&ticket, attachments).await?;

        let categories = self.database.taxonomy.list_categories(&ticket.organization_id)?;
        let tags = self.database.taxonomy.list_tags(&ticket.organization_id)?;
        let context = RoutingContext::new(&ticket.title, &ticket.description, &categories, &tags);
        let routing = self.runner.run(&TicketRouter, &context).await?;
        debug!(
            "Routed ticket {}: priority {}, categories {:?}, tags {:?}",
            ticket.id, routing.priority, routing.suggested_categories, routing.suggested_tags
        );

        let (matched_categories, unmatched_categories) =
            resolve_by_name(&routing.suggested_categories, &categories, |c| &c.name);
        let (matched_tags, unmatched_tags) =
            resolve_by_name(&routing.suggested_tags, &tags, |t| &t.name);
        if !unmatched_categories.is_empty() || !unmatched_tags.is_empty() {
            warn!(
                "Dropped unknown suggestions for ticket {}: categories {:?}, tags {:?}",
                ticket.id, unmatched_categories, unmatched_tags
            );
        }

        let assignments: Vec<CategoryAssignment> = matched_categories
            .iter()
            .enumerate()
            .map(|(i, category)| CategoryAssignment {
                ticket_id: ticket.id.clone(),
                category_id: category.id.clone(),
                is_primary_category: i == 0,
            })
            .collect();
        let tag_ids: Vec<String> = matched_tags.iter().map(|t| t.id.clone()).collect();
        self.database.taxonomy.replace_category_assignments(&ticket.id, &assignments)?;
        self.database.taxonomy.replace_tag_assignments(&ticket.id, &tag_ids)?;
        self.database.tickets.update_priority(&ticket.id, routing.priority)?;

        let mut sent = Vec::new();
        let team = matched_categories
            .iter()
            .find_map(|c| c.team_id.as_ref().map(|team| (team.clone(), c.name.clone())));
        match &team {
            Some((team_id, category_name)) => {
                self.database.tickets.assign_team(&ticket.id, Some(team_id))?;
                self.notify(
                    &ticket,
                    NotificationType::TeamAssignment,
                    format!("New ticket assigned to your team: {}", ticket.title),
                    format!("Routed via category {} with priority {}", category_name, routing.priority),
                    &mut sent,
                )?;
            }
            None => {
                self.database.tickets.assign_team(&ticket.id, None)?;
                self.notify(
                    &ticket,
                    NotificationType::OrphanTicket,
                    format!("Ticket needs manual assignment: {}", ticket.title),
                    "No category with an owning team matched this ticket".to_string(),
                    &mut sent,
                )?;
            }
        }
        if routing.priority == Priority::Urgent {
            let content = routing
                .human_review_reason
                .clone()
                .unwrap_or_else(|| "Router classified this ticket as urgent".to_string());
            self.notify(
                &ticket,
                NotificationType::HighPriority,
                format!("Urgent ticket: {}", ticket.title),
                content,
                &mut sent,
            )?;
        }

        info!(
            "Ticket {} routed: {} content chunk(s), {} attachment chunk(s), {} categor(ies), {} tag(s)",
            ticket.id,
            content_chunks,
            attachment_chunks,
            assignments.len(),
            tag_ids.len()
        );

        Ok(IntakeOutcome::Routed(RoutedTicket {
            ticket_id: ticket.id,
            category_ids: assignments.into_iter().map(|a| a.category_id).collect(),
            tag_ids,
            unmatched_categories,
            unmatched_tags,
            assigned_team_id: team.map(|(team_id, _)| team_id),
            notifications: sent,
            content_chunks,
            attachment_chunks,
            routing,
        }))
    }

    /// Chunk and embed body and attachment text, replacing any earlier rows
    /// for the ticket. Attachment chunks follow body chunks in index order.
    async fn embed_ticket(
        &self,
        ticket: &Ticket,
        attachments: &[AttachmentRef],
    ) -> Result<(usize, usize), PipelineError> {
        let body_chunks = self.chunker.chunk(&ticket.content_text());

        let mut attachment_chunks = Vec::new();
        match (&self.document_parser, attachments.is_empty()) {
            (_, true) => {}
            (None, false) => {
                debug!("Attachment extraction disabled; skipping {} file(s)", attachments.len());
            }
            (Some(parser), false) => {
                let extracted = join_all(attachments.iter().map(|a| parser.extract(a))).await;
                for (attachment, text) in attachments.iter().zip(extracted) {
                    match text {
                        Some(text) => attachment_chunks.extend(self.chunker.chunk(&text)),
                        None => debug!("No text contributed by {}", attachment.file_name),
                    }
                }
            }
        }

        let kinds = std::iter::repeat(ChunkKind::Content)
            .take(body_chunks.len())
            .chain(std::iter::repeat(ChunkKind::Attachment).take(attachment_chunks.len()));
        let (content_count, attachment_count) = (body_chunks.len(), attachment_chunks.len());
        let texts: Vec<String> = body_chunks.into_iter().chain(attachment_chunks).collect();

        let vectors = self.embedder.embed_all(&texts).await?;
        let rows: Vec<TicketEmbedding> = texts
            .into_iter()
            .zip(vectors)
            .zip(kinds)
            .enumerate()
            .map(|(chunk_index, ((chunk_text, embedding), chunk_kind))| TicketEmbedding {
                ticket_id: ticket.id.clone(),
                chunk_index,
                chunk_kind,
                chunk_text,
                embedding,
                embedding_model: self.embedder.model_name().to_string(),
            })
            .collect();
        self.database.embeddings.replace_ticket_embeddings(&ticket.id, &rows)?;

        Ok((content_count, attachment_count))
    }

    /// Retrieve and condense knowledge for `query`; no model call on an empty result.
    /// Only the first chunk-sized window of `query` is embedded.
    async fn gather_knowledge(
        &self,
        query: &str,
        organization_id: &str,
    ) -> Result<(Vec<KnowledgeMatch>, KnowledgeSummary), PipelineError> {
        let query_embedding = self.embedder.embed(self.chunker.head(query)).await?;
        let matches = self.retriever.search(&query_embedding, organization_id)?;
        if matches.is_empty() {
            debug!("No knowledge matches; using empty summary");
            return Ok((matches, KnowledgeSummary::no_relevant_content()));
        }

        let summary = self.runner.run(&Summarizer, matches.as_slice()).await?;
        let dropped = missing_details(&matches, &summary);
        if !dropped.is_empty() {
            warn!("Summary omitted {} detail token(s): {:?}", dropped.len(), dropped);
        }
        Ok((matches, summary))
    }

    async fn resolve(
        &self,
        ticket_id: &str,
        resolution: &Resolution,
    ) -> Result<ResolutionOutcome, PipelineError> {
        if resolution.content.trim().is_empty() {
            return Err(PipelineError::InvalidInput("resolution text is empty".to_string()));
        }
        let ticket = self.load_ticket(ticket_id)?;
        info!("Processing resolution for ticket {} ({})", ticket.id, ticket.status);

        let query = format!("{}\n\n{}", ticket.content_text(), resolution.content.trim());
        let (matches, summary) = self.gather_knowledge(&query, &ticket.organization_id).await?;

        let review = KnowledgeReview {
            ticket: ticket.clone(),
            resolution: resolution.content.clone(),
            summary: summary.clone(),
            matches,
        };
        let evaluation = self.runner.run(&KnowledgeAgent, &review).await?;
        if evaluation.new_knowledge_extracted && evaluation.updates_to_apply().is_empty() {
            warn!("Knowledge agent reported new knowledge without updates");
        }

        let mut applied = Vec::new();
        for update in evaluation.updates_to_apply() {
            let result = self
                .knowledge
                .apply(
                    &ticket.organization_id,
                    update,
                    &resolution.resolved_by,
                    Some(&ticket.id),
                )
                .await?;
            applied.push(result);
        }

        let time_to_resolve_minutes = (Utc::now() - ticket.created_at).num_minutes().max(0);
        let analytics = self
            .runner
            .run(
                &AnalyticsEvaluator,
                &AnalyticsInput {
                    ticket: ticket.clone(),
                    resolution: resolution.content.clone(),
                    time_to_resolve_minutes,
                },
            )
            .await?;

        self.database.tickets.update_status(&ticket.id, TicketStatus::Resolved)?;

        let mut sent = Vec::new();
        if analytics.needs_feedback {
            let mut content = format!("Feedback requested via {}", analytics.feedback_type.as_str());
            if !analytics.learning_opportunities.is_empty() {
                content.push_str(&format!(
                    ". Learning opportunities: {}",
                    analytics.learning_opportunities.join("; ")
                ));
            }
            self.notify(
                &ticket,
                NotificationType::ResolutionFeedback,
                format!("Feedback needed for resolved ticket: {}", ticket.title),
                content,
                &mut sent,
            )?;
        }
        let target = ticket.priority.resolution_target_minutes();
        if time_to_resolve_minutes > target {
            self.notify(
                &ticket,
                NotificationType::SlaBreach,
                format!("SLA breached: {}", ticket.title),
                format!(
                    "Resolved after {} minutes; {} priority target is {} minutes",
                    time_to_resolve_minutes, ticket.priority, target
                ),
                &mut sent,
            )?;
        }

        info!(
            "Ticket {} resolved in {} minutes ({} knowledge update(s))",
            ticket.id,
            time_to_resolve_minutes,
            applied.len()
        );

        let report = ResolutionReport {
            ticket_id: ticket.id,
            knowledge_summary: summary,
            knowledge_evaluation: evaluation,
            applied_updates: applied,
            analytics,
            time_to_resolve_minutes,
            notifications: sent,
        };
        Ok(if report.applied_updates.is_empty() {
            ResolutionOutcome::ResolvedWithoutUpdate(report)
        } else {
            ResolutionOutcome::KnowledgeUpdated(report)
        })
    }

    async fn draft(&self, ticket_id: &str, message: &str) -> Result<DraftedResponse, PipelineError> {
        if message.trim().is_empty() {
            return Err(PipelineError::InvalidInput("message is empty".to_string()));
        }
        let ticket = self.load_ticket(ticket_id)?;

        let query = format!("{}\n\n{}", ticket.title.trim(), message.trim());
        let (_, summary) = self.gather_knowledge(&query, &ticket.organization_id).await?;

        let request = SupportRequest {
            message: message.to_string(),
            ticket,
            knowledge: summary.clone(),
        };
        let support = self.runner.run(&SupportAgent, &request).await?;
        let stored = self
            .database
            .messages
            .insert(ticket_id, AI_AUTHOR, &support.response, true)?;
        info!(
            "Drafted reply for ticket {} (confidence {:.2}, next action {:?})",
            ticket_id, support.confidence_score, support.next_action
        );

        Ok(DraftedResponse {
            support,
            knowledge_summary: summary,
            message: stored,
        })
    }
}

/// Map suggested names onto organization rows: trimmed, case-insensitive,
/// first occurrence wins. Returns matched rows in suggestion order and the
/// names that matched nothing.
fn resolve_by_name<'a, T>(
    suggested: &[String],
    rows: &'a [T],
    name: impl Fn(&T) -> &String,
) -> (Vec<&'a T>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for suggestion in suggested {
        let wanted = suggestion.trim().to_lowercase();
        if wanted.is_empty() || !seen.insert(wanted.clone()) {
            continue;
        }
        match rows.iter().find(|row| name(row).trim().to_lowercase() == wanted) {
            Some(row) => matched.push(row),
            None => unmatched.push(suggestion.trim().to_string()),
        }
    }
    (matched, unmatched)
}
