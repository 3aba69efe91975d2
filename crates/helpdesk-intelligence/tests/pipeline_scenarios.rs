mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use std::sync::atomic::Ordering;
use tokio_test::{assert_err, assert_ok};

use helpdesk_intelligence::helpdesk_db::{
    ChunkKind, KnowledgeSourceType, NotificationType, Priority, Ticket, TicketStatus,
};
use helpdesk_intelligence::llm::AttachmentRef;
use helpdesk_intelligence::{IntakeOutcome, PipelineError, Resolution, ResolutionOutcome};

const NO_UPDATE: &str = r#"{"relevant_articles":[],"new_knowledge_extracted":false}"#;

fn resolution(content: &str) -> Resolution {
    Resolution {
        content: content.to_string(),
        resolved_by: "agent-7".to_string(),
    }
}

fn notification_types(h: &Harness, ticket: &Ticket) -> Vec<NotificationType> {
    h.database
        .notifications
        .list_for_entity("ticket", &ticket.id)
        .unwrap()
        .into_iter()
        .map(|n| n.notification_type)
        .collect()
}

#[tokio::test]
async fn test_intake_routes_to_category_team() {
    let h = harness();
    h.add_category(ORG, "cat-billing", "Account & Billing", Some("team-billing"));
    h.add_category(ORG, "cat-tech", "Technical", None);
    h.chat.reply("router", &routing_reply("normal", &["Account & Billing"], &[]));
    let ticket = h.create_ticket(ORG, "Reset my password", "I can't log in");

    let outcome = h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    let routed = match outcome {
        IntakeOutcome::Routed(routed) => routed,
        other => panic!("expected routed ticket, got {:?}", other),
    };
    assert_eq!(routed.category_ids, vec!["cat-billing"]);
    assert!(routed.tag_ids.is_empty());
    assert_eq!(routed.assigned_team_id.as_deref(), Some("team-billing"));

    let stored = h.reload(&ticket);
    assert_eq!(stored.priority, Priority::Normal);
    assert_eq!(stored.status, TicketStatus::Open);
    assert_eq!(stored.assigned_team_id.as_deref(), Some("team-billing"));

    let assignments = h.database.taxonomy.category_assignments(&ticket.id).unwrap();
    assert_eq!(assignments.len(), 1);
    assert!(assignments[0].is_primary_category);
    assert!(h.database.taxonomy.tag_assignments(&ticket.id).unwrap().is_empty());

    assert_eq!(notification_types(&h, &ticket), vec![NotificationType::TeamAssignment]);
    assert!(!h.database.embeddings.ticket_embeddings(&ticket.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_flagged_ticket_is_closed_without_further_work() {
    let h = harness();
    h.add_category(ORG, "cat-tech", "Technical", Some("team-tech"));
    let ticket = h.create_ticket(ORG, "Complaint", "This contains disallowed language");

    let outcome = h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    assert!(matches!(outcome, IntakeOutcome::Flagged(_)));

    let stored = h.reload(&ticket);
    assert_eq!(stored.status, TicketStatus::Closed);
    assert_eq!(stored.priority, Priority::Urgent);
    assert_eq!(notification_types(&h, &ticket), vec![NotificationType::HighPriority]);

    assert!(h.database.embeddings.ticket_embeddings(&ticket.id).unwrap().is_empty());
    assert!(h.database.taxonomy.category_assignments(&ticket.id).unwrap().is_empty());
    assert_eq!(h.embeddings.calls.load(Ordering::SeqCst), 0);
    assert!(h.chat.steps_called().is_empty());
    assert_eq!(h.moderation.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_matched_category_is_the_only_primary() {
    let h = harness();
    h.add_category(ORG, "cat-a", "Alpha", None);
    h.add_category(ORG, "cat-b", "Beta", Some("team-b"));
    h.add_category(ORG, "cat-c", "Gamma", Some("team-c"));
    h.add_tag(ORG, "tag-vpn", "vpn");
    h.chat.reply(
        "router",
        &routing_reply("high", &["Shipping", "alpha", "Beta", "GAMMA", "Alpha"], &["VPN", "unknown"]),
    );
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");

    h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();

    let assignments = h.database.taxonomy.category_assignments(&ticket.id).unwrap();
    assert_eq!(assignments.len(), 3);
    let primary: Vec<&str> = assignments
        .iter()
        .filter(|a| a.is_primary_category)
        .map(|a| a.category_id.as_str())
        .collect();
    assert_eq!(primary, vec!["cat-a"]);

    let tags = h.database.taxonomy.tag_assignments(&ticket.id).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_id, "tag-vpn");

    // Alpha has no team, so the first matched category with one owns the ticket.
    assert_eq!(h.reload(&ticket).assigned_team_id.as_deref(), Some("team-b"));
    assert_eq!(h.reload(&ticket).priority, Priority::High);
}

#[tokio::test]
async fn test_no_team_match_raises_orphan_and_urgent_notifications() {
    let h = harness();
    h.add_category(ORG, "cat-tech", "Technical", None);
    h.chat.reply("router", &routing_reply("urgent", &["Technical"], &[]));
    let ticket = h.create_ticket(ORG, "Production down", "All requests fail with 502");

    h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();

    let types = notification_types(&h, &ticket);
    assert!(types.contains(&NotificationType::OrphanTicket));
    assert!(types.contains(&NotificationType::HighPriority));
    assert!(h.reload(&ticket).assigned_team_id.is_none());
}

#[tokio::test]
async fn test_rerunning_intake_replaces_previous_rows() {
    let h = harness();
    h.add_category(ORG, "cat-tech", "Technical", Some("team-tech"));
    h.add_tag(ORG, "tag-vpn", "vpn");
    h.chat.reply("router", &routing_reply("normal", &["Technical"], &["vpn"]));
    let ticket = h.create_ticket(
        ORG,
        "VPN drops",
        "The corporate VPN disconnects every ten minutes while on the office wifi network",
    );

    h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    let first = h.database.embeddings.ticket_embeddings(&ticket.id).unwrap();
    h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    let second = h.database.embeddings.ticket_embeddings(&ticket.id).unwrap();

    assert!(first.len() > 1);
    assert_eq!(first.len(), second.len());
    let indices: Vec<usize> = second.iter().map(|e| e.chunk_index).collect();
    assert_eq!(indices, (0..second.len()).collect::<Vec<_>>());
    assert_eq!(h.database.taxonomy.category_assignments(&ticket.id).unwrap().len(), 1);
    assert_eq!(h.database.taxonomy.tag_assignments(&ticket.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_rerouting_to_teamless_category_clears_team() {
    let h = harness();
    h.add_category(ORG, "cat-tech", "Technical", Some("team-tech"));
    h.add_category(ORG, "cat-gen", "General", None);
    h.chat
        .reply("router", &routing_reply("normal", &["Technical"], &[]))
        .reply("router", &routing_reply("normal", &["General"], &[]));
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");

    h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    assert_eq!(h.reload(&ticket).assigned_team_id.as_deref(), Some("team-tech"));

    let outcome = h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap();
    let routed = match outcome {
        IntakeOutcome::Routed(routed) => routed,
        other => panic!("expected routed ticket, got {:?}", other),
    };
    assert!(routed.assigned_team_id.is_none());
    assert_eq!(h.reload(&ticket).assigned_team_id, routed.assigned_team_id);

    let assignments = h.database.taxonomy.category_assignments(&ticket.id).unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].category_id, "cat-gen");
}

#[tokio::test]
async fn test_attachment_chunks_follow_body_and_failures_are_skipped() {
    let parser = CannedParser::default().with(
        "manual.pdf",
        "Router model X200 firmware 4.2 must be installed before pairing the device",
    );
    let h = harness_with(test_config(), parser);
    h.chat.reply("router", &routing_reply("low", &[], &[]));
    let ticket = h.create_ticket(ORG, "Pairing", "Cannot pair");
    let attachments = vec![
        AttachmentRef::inline("manual.pdf", b"%PDF".to_vec()),
        AttachmentRef::inline("broken.pdf", b"garbage".to_vec()),
    ];

    let outcome = h.pipeline.process_new_ticket(&ticket, &attachments).await.unwrap();
    let routed = match outcome {
        IntakeOutcome::Routed(routed) => routed,
        other => panic!("expected routed ticket, got {:?}", other),
    };
    assert_eq!(routed.content_chunks, 1);
    assert_eq!(routed.attachment_chunks, 3);
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 2);

    let rows = h.database.embeddings.ticket_embeddings(&ticket.id).unwrap();
    let kinds: Vec<ChunkKind> = rows.iter().map(|r| r.chunk_kind).collect();
    assert_eq!(
        kinds,
        vec![ChunkKind::Content, ChunkKind::Attachment, ChunkKind::Attachment, ChunkKind::Attachment]
    );
    assert!(rows[1].chunk_text.starts_with("Router model X200"));
}

#[tokio::test]
async fn test_embedding_failure_is_retryable_and_leaves_ticket_untouched() {
    let h = harness();
    h.add_category(ORG, "cat-tech", "Technical", Some("team-tech"));
    h.chat.reply("router", &routing_reply("high", &["Technical"], &[]));
    h.embeddings.fail.store(true, Ordering::SeqCst);
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");

    let err = assert_err!(h.pipeline.process_new_ticket(&ticket, &[]).await);
    assert!(err.is_retryable());
    assert!(h.chat.steps_called().is_empty());
    assert_eq!(h.reload(&ticket).priority, Priority::Normal);
    assert!(h.database.taxonomy.category_assignments(&ticket.id).unwrap().is_empty());

    h.embeddings.fail.store(false, Ordering::SeqCst);
    assert_ok!(h.pipeline.process_new_ticket(&ticket, &[]).await);
    assert_eq!(h.reload(&ticket).priority, Priority::High);
}

#[tokio::test]
async fn test_router_contract_violation_surfaces_as_error() {
    let h = harness();
    h.chat.reply("router", r#"{"priority":"critical"}"#);
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");

    let err = h.pipeline.process_new_ticket(&ticket, &[]).await.unwrap_err();
    assert!(matches!(err, PipelineError::Contract { step: "router", .. }));
    assert!(!err.is_retryable());
    assert!(notification_types(&h, &ticket).is_empty());
}

#[tokio::test]
async fn test_intake_rejects_foreign_organization() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    let mut forged = ticket.clone();
    forged.organization_id = OTHER_ORG.to_string();

    let err = h.pipeline.process_new_ticket(&forged, &[]).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert_eq!(h.moderation.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resolution_replaces_knowledge_source() {
    let h = harness();
    let seeded = h
        .pipeline
        .knowledge_base()
        .replace_source(
            ORG,
            KnowledgeSourceType::Faq,
            "F1",
            "Password resets: open Settings, choose Security, then request a reset link by email.",
            "seed",
            "admin",
            None,
        )
        .await
        .unwrap();
    assert_eq!(seeded, 3);

    let ticket = h.create_ticket(ORG, "Password reset", "Reset link never arrives");
    h.chat
        .reply(
            "summarizer",
            r#"{"summary":"Reset links are requested from Settings > Security.",
                "key_points":["Open Settings","Choose Security"],
                "source_references":[{"source_type":"faq","source_id":"F1","relevance":0.8}]}"#,
        )
        .reply(
            "knowledge_agent",
            r#"{"relevant_articles":[{"source_type":"faq","source_id":"F1","relevance":0.8}],
                "new_knowledge_extracted":true,
                "knowledge_updates":[{"source_type":"faq","source_id":"F1",
                  "content":"Reset links expire after 15 minutes; check spam.",
                  "reason":"Resolution found links expire"}]}"#,
        )
        .reply("analytics", &analytics_reply(false));

    let outcome = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("The link had expired; resent it and checked spam."))
        .await
        .unwrap();

    let report = match &outcome {
        ResolutionOutcome::KnowledgeUpdated(report) => report,
        other => panic!("expected knowledge update, got {:?}", other),
    };
    assert_eq!(report.applied_updates.len(), 1);
    assert_eq!(report.applied_updates[0].source_id, "F1");
    assert!(!report.applied_updates[0].created);

    let chunks = h
        .database
        .embeddings
        .knowledge_source_chunks(KnowledgeSourceType::Faq, "F1")
        .unwrap();
    assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), vec![0, 1]);
    assert!(chunks.iter().all(|c| c.metadata.updated_by == "agent-7"));
    assert!(chunks.iter().all(|c| c.metadata.ticket_id.as_deref() == Some(ticket.id.as_str())));

    assert_eq!(h.reload(&ticket).status, TicketStatus::Resolved);
    assert_eq!(
        h.chat.steps_called(),
        vec!["summarizer", "knowledge_agent", "analytics"]
    );
}

#[tokio::test]
async fn test_retrieval_never_crosses_organizations() {
    let h = harness();
    h.pipeline
        .knowledge_base()
        .replace_source(
            OTHER_ORG,
            KnowledgeSourceType::Article,
            "SECRET",
            "Password reset internal escalation path",
            "seed",
            "admin",
            None,
        )
        .await
        .unwrap();
    h.pipeline
        .knowledge_base()
        .replace_source(ORG, KnowledgeSourceType::Faq, "F1", "Password reset steps", "seed", "admin", None)
        .await
        .unwrap();

    let ticket = h.create_ticket(ORG, "Password reset", "Reset link never arrives");
    h.chat
        .reply(
            "summarizer",
            r#"{"summary":"Follow the password reset steps.","key_points":[],
                "source_references":[{"source_type":"faq","source_id":"F1","relevance":0.7}]}"#,
        )
        .reply("knowledge_agent", NO_UPDATE)
        .reply("analytics", &analytics_reply(false));

    let outcome = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("Resent the password reset link."))
        .await
        .unwrap();
    assert!(matches!(outcome, ResolutionOutcome::ResolvedWithoutUpdate(_)));

    let prompt = h.chat.prompt_for("summarizer").unwrap();
    assert!(prompt.contains("source_id: F1"));
    assert!(!prompt.contains("SECRET"));
    assert!(!prompt.contains("escalation path"));
}

#[tokio::test]
async fn test_empty_knowledge_base_skips_summarizer() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply("knowledge_agent", NO_UPDATE)
        .reply("analytics", &analytics_reply(false));

    let outcome = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("Set MTU to 1400."))
        .await
        .unwrap();

    assert!(outcome.report().knowledge_summary.is_empty());
    assert_eq!(h.chat.steps_called(), vec!["knowledge_agent", "analytics"]);
    assert!(h
        .chat
        .prompt_for("knowledge_agent")
        .unwrap()
        .contains("No relevant knowledge base content"));
}

#[tokio::test]
async fn test_new_source_without_id_gets_one_allocated() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply(
            "knowledge_agent",
            r#"{"relevant_articles":[],"new_knowledge_extracted":true,
                "knowledge_updates":[{"source_type":"article",
                  "content":"VPN disconnects: set the adapter MTU to 1400.","reason":"new fix"}]}"#,
        )
        .reply("analytics", &analytics_reply(false));

    let outcome = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("Set MTU to 1400."))
        .await
        .unwrap();

    let applied = &outcome.report().applied_updates[0];
    assert!(applied.created);
    let chunks = h
        .database
        .embeddings
        .knowledge_source_chunks(KnowledgeSourceType::Article, &applied.source_id)
        .unwrap();
    assert_eq!(chunks.len(), applied.chunk_count);
    assert!(chunks.iter().all(|c| c.organization_id == ORG));
}

#[tokio::test]
async fn test_update_to_other_organizations_source_is_not_retryable() {
    let h = harness();
    h.pipeline
        .knowledge_base()
        .replace_source(OTHER_ORG, KnowledgeSourceType::Faq, "F1", "Their FAQ", "seed", "admin", None)
        .await
        .unwrap();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply(
            "knowledge_agent",
            r#"{"relevant_articles":[],"new_knowledge_extracted":true,
                "knowledge_updates":[{"source_type":"faq","source_id":"F1",
                  "content":"Set MTU to 1400.","reason":"fix"}]}"#,
        )
        .reply("analytics", &analytics_reply(false));

    let err = assert_err!(
        h.pipeline
            .process_ticket_resolution(&ticket.id, &resolution("Set MTU to 1400."))
            .await
    );

    assert!(matches!(err, PipelineError::Contract { step: "knowledge_agent", .. }));
    assert!(!err.is_retryable());
    assert_eq!(h.reload(&ticket).status, TicketStatus::Open);
    let chunks = h
        .database
        .embeddings
        .knowledge_source_chunks(KnowledgeSourceType::Faq, "F1")
        .unwrap();
    assert!(chunks.iter().all(|c| c.organization_id == OTHER_ORG));
}

#[tokio::test]
async fn test_long_resolution_query_is_bounded_to_one_chunk() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", &"The tunnel disconnects again. ".repeat(20));
    h.chat
        .reply("knowledge_agent", NO_UPDATE)
        .reply("analytics", &analytics_reply(false));

    h.pipeline
        .process_ticket_resolution(&ticket.id, &resolution(&"Set MTU to 1400. ".repeat(20)))
        .await
        .unwrap();

    assert!(h.embeddings.longest_input.load(Ordering::SeqCst) <= test_config().chunk_size);
    assert_eq!(h.reload(&ticket).status, TicketStatus::Resolved);
}

#[tokio::test]
async fn test_analytics_failure_leaves_ticket_open() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply("knowledge_agent", NO_UPDATE)
        .fail("analytics", "model overloaded");

    let err = assert_err!(
        h.pipeline
            .process_ticket_resolution(&ticket.id, &resolution("Set MTU to 1400."))
            .await
    );

    assert!(err.is_retryable());
    assert_eq!(h.reload(&ticket).status, TicketStatus::Open);
    assert!(notification_types(&h, &ticket).is_empty());
}

#[tokio::test]
async fn test_slow_urgent_resolution_breaches_sla() {
    let h = harness();
    let mut ticket = Ticket::new(ORG, "Production down", "All requests fail with 502");
    ticket.priority = Priority::Urgent;
    ticket.created_at = Utc::now() - ChronoDuration::hours(5);
    h.database.tickets.insert_ticket(&ticket).unwrap();
    h.chat
        .reply("knowledge_agent", NO_UPDATE)
        .reply("analytics", &analytics_reply(false));

    let outcome = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("Restarted the load balancer."))
        .await
        .unwrap();

    assert!(outcome.report().time_to_resolve_minutes >= 300);
    assert_eq!(notification_types(&h, &ticket), vec![NotificationType::SlaBreach]);
}

#[tokio::test]
async fn test_feedback_request_creates_notification() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply("knowledge_agent", NO_UPDATE)
        .reply("analytics", &analytics_reply(true));

    h.pipeline
        .process_ticket_resolution(&ticket.id, &resolution("Set MTU to 1400."))
        .await
        .unwrap();

    let notifications = h
        .database
        .notifications
        .list_for_entity("ticket", &ticket.id)
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, NotificationType::ResolutionFeedback);
    assert!(notifications[0].content.contains("automated"));
    assert!(notifications[0].content.contains("password reset FAQ"));
}

#[tokio::test]
async fn test_resolution_input_errors() {
    let h = harness();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");

    let err = h
        .pipeline
        .process_ticket_resolution(&ticket.id, &resolution("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));

    let err = h
        .pipeline
        .process_ticket_resolution("missing", &resolution("done"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { entity: "ticket", .. }));
    assert!(h.chat.steps_called().is_empty());
}

#[tokio::test]
async fn test_draft_is_stored_as_internal_message() {
    let h = harness();
    h.pipeline
        .knowledge_base()
        .replace_source(ORG, KnowledgeSourceType::Faq, "F1", "VPN MTU must be 1400", "seed", "admin", None)
        .await
        .unwrap();
    let ticket = h.create_ticket(ORG, "VPN drops", "Disconnects every 10 minutes");
    h.chat
        .reply(
            "summarizer",
            r#"{"summary":"VPN MTU must be 1400.","key_points":[],
                "source_references":[{"source_type":"faq","source_id":"F1","relevance":0.9}]}"#,
        )
        .reply(
            "support_agent",
            r#"{"response":"Please set your VPN adapter MTU to 1400 and reconnect.",
                "needs_human_review":false,"confidence_score":0.82,"next_action":"wait_for_customer"}"#,
        );

    let drafted = h
        .pipeline
        .draft_support_response(&ticket.id, "It keeps dropping, what can I do?")
        .await
        .unwrap();

    assert!(drafted.support.response.contains("MTU to 1400"));
    assert_eq!(drafted.message.author, "ai_assistant");
    assert!(drafted.message.is_internal);

    let messages = h.database.messages.list_for_ticket(&ticket.id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, drafted.support.response);
    assert!(h.chat.prompt_for("support_agent").unwrap().contains("It keeps dropping"));
    assert_eq!(h.reload(&ticket).status, TicketStatus::Open);
}
