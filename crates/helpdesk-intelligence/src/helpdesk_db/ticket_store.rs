//! Ticket storage and status transitions
use crate::helpdesk_db::schema::*;
use crate::helpdesk_db::{get_conn, DbPool, PooledConn};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

pub struct TicketStore {
    pool: DbPool,
}

impl TicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<PooledConn> {
        get_conn(&self.pool)
    }

    pub fn insert_ticket(&self, ticket: &Ticket) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tickets
             (id, organization_id, title, description, status, priority,
              assigned_team_id, assigned_user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &ticket.id,
                &ticket.organization_id,
                &ticket.title,
                &ticket.description,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.assigned_team_id.as_deref(),
                ticket.assigned_user_id.as_deref(),
                ticket.created_at.to_rfc3339(),
                ticket.updated_at.to_rfc3339(),
            ],
        )?;
        debug!("Inserted ticket {} for organization {}", ticket.id, ticket.organization_id);
        Ok(())
    }

    pub fn get_ticket(&self, ticket_id: &str) -> anyhow::Result<Option<Ticket>> {
        let conn = self.get_conn()?;
        let ticket = conn
            .query_row(
                "SELECT id, organization_id, title, description, status, priority,
                        assigned_team_id, assigned_user_id, created_at, updated_at
                 FROM tickets WHERE id = ?1",
                [ticket_id],
                Self::row_to_ticket,
            )
            .optional()?;
        Ok(ticket)
    }

    pub fn update_status(&self, ticket_id: &str, status: TicketStatus) -> anyhow::Result<()> {
        self.update_fields(
            ticket_id,
            "UPDATE tickets SET status = ?2, updated_at = ?3 WHERE id = ?1",
            status.as_str(),
        )
    }

    pub fn update_priority(&self, ticket_id: &str, priority: Priority) -> anyhow::Result<()> {
        self.update_fields(
            ticket_id,
            "UPDATE tickets SET priority = ?2, updated_at = ?3 WHERE id = ?1",
            priority.as_str(),
        )
    }

    /// Set status and priority together in one statement.
    pub fn update_status_and_priority(
        &self,
        ticket_id: &str,
        status: TicketStatus,
        priority: Priority,
    ) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE tickets SET status = ?2, priority = ?3, updated_at = ?4 WHERE id = ?1",
            params![ticket_id, status.as_str(), priority.as_str(), Utc::now().to_rfc3339()],
        )?;
        ensure_updated(updated, ticket_id)
    }

    pub fn assign_team(&self, ticket_id: &str, team_id: Option<&str>) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE tickets SET assigned_team_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![ticket_id, team_id, Utc::now().to_rfc3339()],
        )?;
        ensure_updated(updated, ticket_id)
    }

    fn update_fields(&self, ticket_id: &str, sql: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(sql, params![ticket_id, value, Utc::now().to_rfc3339()])?;
        ensure_updated(updated, ticket_id)
    }

    fn row_to_ticket(row: &Row) -> rusqlite::Result<Ticket> {
        let status: String = row.get(4)?;
        let priority: String = row.get(5)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;
        Ok(Ticket {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: parse_text_enum(4, &status)?,
            priority: parse_text_enum(5, &priority)?,
            assigned_team_id: row.get(6)?,
            assigned_user_id: row.get(7)?,
            created_at: parse_timestamp(8, &created_at)?,
            updated_at: parse_timestamp(9, &updated_at)?,
        })
    }
}

fn ensure_updated(rows: usize, ticket_id: &str) -> anyhow::Result<()> {
    if rows == 0 {
        anyhow::bail!("ticket {} does not exist", ticket_id);
    }
    Ok(())
}
