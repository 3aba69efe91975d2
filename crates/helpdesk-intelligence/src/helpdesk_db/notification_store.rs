//! Append-only notification storage
use crate::helpdesk_db::schema::*;
use crate::helpdesk_db::{get_conn, DbPool, PooledConn};
use chrono::Utc;
use rusqlite::{params, Row};
use tracing::info;

pub struct NotificationStore {
    pool: DbPool,
}

impl NotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<PooledConn> {
        get_conn(&self.pool)
    }

    pub fn insert(&self, notification: &NewNotification) -> anyhow::Result<Notification> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO notifications
             (type, title, content, entity_type, entity_id, organization_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.notification_type.as_str(),
                &notification.title,
                &notification.content,
                &notification.entity_type,
                &notification.entity_id,
                &notification.organization_id,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(
            "Notification {} ({}) created for {} {}",
            id, notification.notification_type, notification.entity_type, notification.entity_id
        );

        Ok(Notification {
            id,
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            content: notification.content.clone(),
            entity_type: notification.entity_type.clone(),
            entity_id: notification.entity_id.clone(),
            organization_id: notification.organization_id.clone(),
            created_at: now,
        })
    }

    pub fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> anyhow::Result<Vec<Notification>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, title, content, entity_type, entity_id, organization_id, created_at
             FROM notifications WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![entity_type, entity_id], Self::row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_for_organization(&self, organization_id: &str) -> anyhow::Result<Vec<Notification>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, title, content, entity_type, entity_id, organization_id, created_at
             FROM notifications WHERE organization_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([organization_id], Self::row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
        let notification_type: String = row.get(1)?;
        let created_at: String = row.get(7)?;
        Ok(Notification {
            id: row.get(0)?,
            notification_type: parse_text_enum(1, &notification_type)?,
            title: row.get(2)?,
            content: row.get(3)?,
            entity_type: row.get(4)?,
            entity_id: row.get(5)?,
            organization_id: row.get(6)?,
            created_at: parse_timestamp(7, &created_at)?,
        })
    }
}
