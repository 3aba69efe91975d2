//! Ticket conversation messages (AI drafts are stored as internal messages)
use crate::helpdesk_db::schema::*;
use crate::helpdesk_db::{get_conn, DbPool, PooledConn};
use chrono::Utc;
use rusqlite::params;

pub struct MessageStore {
    pool: DbPool,
}

impl MessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<PooledConn> {
        get_conn(&self.pool)
    }

    pub fn insert(
        &self,
        ticket_id: &str,
        author: &str,
        content: &str,
        is_internal: bool,
    ) -> anyhow::Result<TicketMessage> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO ticket_messages (ticket_id, author, content, is_internal, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ticket_id, author, content, is_internal, now.to_rfc3339()],
        )?;
        Ok(TicketMessage {
            id: conn.last_insert_rowid(),
            ticket_id: ticket_id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            is_internal,
            created_at: now,
        })
    }

    pub fn list_for_ticket(&self, ticket_id: &str) -> anyhow::Result<Vec<TicketMessage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, author, content, is_internal, created_at
             FROM ticket_messages WHERE ticket_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([ticket_id], |row| {
                let created_at: String = row.get(5)?;
                Ok(TicketMessage {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    author: row.get(2)?,
                    content: row.get(3)?,
                    is_internal: row.get(4)?,
                    created_at: parse_timestamp(5, &created_at)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
