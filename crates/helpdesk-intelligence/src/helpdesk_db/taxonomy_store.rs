//! Organization-scoped categories and tags, and their assignment to tickets
use crate::helpdesk_db::schema::*;
use crate::helpdesk_db::{get_conn, DbPool, PooledConn};
use rusqlite::{params, Row, TransactionBehavior};
use tracing::debug;

pub struct TaxonomyStore {
    pool: DbPool,
}

impl TaxonomyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<PooledConn> {
        get_conn(&self.pool)
    }

    pub fn insert_category(&self, category: &Category) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO categories (id, organization_id, name, team_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                &category.id,
                &category.organization_id,
                &category.name,
                category.team_id.as_deref()
            ],
        )?;
        Ok(())
    }

    pub fn insert_tag(&self, tag: &Tag) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tags (id, organization_id, name) VALUES (?1, ?2, ?3)",
            params![&tag.id, &tag.organization_id, &tag.name],
        )?;
        Ok(())
    }

    pub fn list_categories(&self, organization_id: &str) -> anyhow::Result<Vec<Category>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, organization_id, name, team_id
             FROM categories WHERE organization_id = ?1 ORDER BY name",
        )?;
        let categories = stmt
            .query_map([organization_id], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                    team_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn list_tags(&self, organization_id: &str) -> anyhow::Result<Vec<Tag>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, organization_id, name FROM tags WHERE organization_id = ?1 ORDER BY name",
        )?;
        let tags = stmt
            .query_map([organization_id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    /// Replace every category assignment of a ticket in one transaction.
    /// Rejects input with more than one primary row.
    pub fn replace_category_assignments(
        &self,
        ticket_id: &str,
        assignments: &[CategoryAssignment],
    ) -> anyhow::Result<()> {
        let primaries = assignments.iter().filter(|a| a.is_primary_category).count();
        if primaries > 1 {
            anyhow::bail!("ticket {} would get {} primary categories", ticket_id, primaries);
        }
        if let Some(foreign) = assignments.iter().find(|a| a.ticket_id != ticket_id) {
            anyhow::bail!("assignment for ticket {} passed to ticket {}", foreign.ticket_id, ticket_id);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM ticket_categories WHERE ticket_id = ?1", [ticket_id])?;
        for assignment in assignments {
            tx.execute(
                "INSERT INTO ticket_categories (ticket_id, category_id, is_primary_category)
                 VALUES (?1, ?2, ?3)",
                params![ticket_id, &assignment.category_id, assignment.is_primary_category],
            )?;
        }
        tx.commit()?;
        debug!("Ticket {} now has {} category assignments", ticket_id, assignments.len());
        Ok(())
    }

    /// Replace every tag assignment of a ticket in one transaction.
    pub fn replace_tag_assignments(&self, ticket_id: &str, tag_ids: &[String]) -> anyhow::Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM ticket_tags WHERE ticket_id = ?1", [ticket_id])?;
        for tag_id in tag_ids {
            tx.execute(
                "INSERT INTO ticket_tags (ticket_id, tag_id) VALUES (?1, ?2)",
                params![ticket_id, tag_id],
            )?;
        }
        tx.commit()?;
        debug!("Ticket {} now has {} tag assignments", ticket_id, tag_ids.len());
        Ok(())
    }

    pub fn category_assignments(&self, ticket_id: &str) -> anyhow::Result<Vec<CategoryAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT ticket_id, category_id, is_primary_category
             FROM ticket_categories WHERE ticket_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([ticket_id], Self::row_to_category_assignment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn tag_assignments(&self, ticket_id: &str) -> anyhow::Result<Vec<TagAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT ticket_id, tag_id FROM ticket_tags WHERE ticket_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([ticket_id], |row| {
                Ok(TagAssignment {
                    ticket_id: row.get(0)?,
                    tag_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_category_assignment(row: &Row) -> rusqlite::Result<CategoryAssignment> {
        Ok(CategoryAssignment {
            ticket_id: row.get(0)?,
            category_id: row.get(1)?,
            is_primary_category: row.get(2)?,
        })
    }
}
