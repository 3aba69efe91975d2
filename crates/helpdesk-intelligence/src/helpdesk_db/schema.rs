//! Entity definitions and SQL schema for the helpdesk store
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enum stored as a snake_case TEXT column. Unknown values fail on read
/// instead of silently mapping to a default.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow::anyhow!(
                        "invalid {} value `{}`", stringify!($name), other
                    )),
                }
            }
        }
    };
}

text_enum!(TicketStatus {
    Open => "open",
    InProgress => "in_progress",
    WaitingOnCustomer => "waiting_on_customer",
    Resolved => "resolved",
    Closed => "closed",
});

text_enum!(Priority {
    Low => "low",
    Normal => "normal",
    High => "high",
    Urgent => "urgent",
});

text_enum!(KnowledgeSourceType {
    Faq => "faq",
    Article => "article",
    File => "file",
});

text_enum!(NotificationType {
    OrphanTicket => "orphan_ticket",
    HighPriority => "high_priority",
    SlaBreach => "sla_breach",
    TeamAssignment => "team_assignment",
    ResolutionFeedback => "resolution_feedback",
});

text_enum!(ChunkKind {
    Content => "content",
    Attachment => "attachment",
});

impl Priority {
    /// Resolution-time target used for SLA breach detection.
    pub fn resolution_target_minutes(&self) -> i64 {
        match self {
            Priority::Urgent => 4 * 60,
            Priority::High => 24 * 60,
            Priority::Normal => 72 * 60,
            Priority::Low => 168 * 60,
        }
    }
}

/// A support ticket. `organization_id` never changes after creation and
/// scopes every related lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub assigned_team_id: Option<String>,
    pub assigned_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// New open ticket with normal priority.
    pub fn new(
        organization_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            title: title.into(),
            description: description.into(),
            status: TicketStatus::Open,
            priority: Priority::Normal,
            assigned_team_id: None,
            assigned_user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raw text that moderation and chunking operate on.
    pub fn content_text(&self) -> String {
        format!("{}\n\n{}", self.title.trim(), self.description.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub organization_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub ticket_id: String,
    pub category_id: String,
    pub is_primary_category: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub ticket_id: String,
    pub tag_id: String,
}

/// One embedded chunk of a ticket's content or attachments
#[derive(Debug, Clone)]
pub struct TicketEmbedding {
    pub ticket_id: String,
    pub chunk_index: usize,
    pub chunk_kind: ChunkKind,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunkMetadata {
    pub update_reason: String,
    pub updated_by: String,
    pub total_chunks: usize,
    #[serde(default)]
    pub ticket_id: Option<String>,
}

/// One embedded chunk of a knowledge-base source (FAQ, article, file)
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub organization_id: String,
    pub source_type: KnowledgeSourceType,
    pub source_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub metadata: KnowledgeChunkMetadata,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
}

/// Knowledge chunk returned by similarity search
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeMatch {
    pub source_type: KnowledgeSourceType,
    pub source_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub metadata: KnowledgeChunkMetadata,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub title: String,
    pub content: String,
    pub entity_type: String,
    pub entity_id: String,
    pub organization_id: String,
}

impl NewNotification {
    pub fn for_ticket(
        ticket: &Ticket,
        notification_type: NotificationType,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            content: content.into(),
            entity_type: "ticket".to_string(),
            entity_id: ticket.id.clone(),
            organization_id: ticket.organization_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub content: String,
    pub entity_type: String,
    pub entity_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: String,
    pub author: String,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_tickets: i64,
    pub total_ticket_embeddings: i64,
    pub total_knowledge_chunks: i64,
    pub total_notifications: i64,
}

pub const SCHEMA_SQL: &str = "
-- Tickets table
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    assigned_team_id TEXT,
    assigned_user_id TEXT,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
-- Organization-scoped taxonomy
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    name TEXT NOT NULL,
    team_id TEXT,
    UNIQUE(organization_id, name)
);
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE(organization_id, name)
);
CREATE TABLE IF NOT EXISTS ticket_categories (
    ticket_id TEXT NOT NULL,
    category_id TEXT NOT NULL,
    is_primary_category BOOLEAN NOT NULL DEFAULT FALSE,
    FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE,
    UNIQUE(ticket_id, category_id)
);
CREATE TABLE IF NOT EXISTS ticket_tags (
    ticket_id TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE(ticket_id, tag_id)
);
-- Ticket content embeddings
CREATE TABLE IF NOT EXISTS ticket_embeddings (
    ticket_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_kind TEXT NOT NULL,
    chunk_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_model TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE,
    UNIQUE(ticket_id, chunk_index)
);
-- Knowledge base embeddings
CREATE TABLE IF NOT EXISTS knowledge_base_embeddings (
    organization_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_model TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    UNIQUE(source_type, source_id, chunk_index)
);
-- Notifications (append-only)
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);
-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_tickets_org ON tickets (organization_id);
CREATE INDEX IF NOT EXISTS idx_categories_org ON categories (organization_id);
CREATE INDEX IF NOT EXISTS idx_tags_org ON tags (organization_id);
CREATE INDEX IF NOT EXISTS idx_kb_org ON knowledge_base_embeddings (organization_id);
CREATE INDEX IF NOT EXISTS idx_notifications_entity ON notifications (entity_type, entity_id);
";

/// Ticket conversation messages, added after the initial release
pub const MESSAGES_SQL: &str = "
CREATE TABLE IF NOT EXISTS ticket_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    is_internal BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages (ticket_id);
";

/// Parse an RFC 3339 column value, mapping failures to a rusqlite conversion error.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse a text-enum column value, mapping failures to a rusqlite conversion error.
pub(crate) fn parse_text_enum<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}
