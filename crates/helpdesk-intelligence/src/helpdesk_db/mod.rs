//! Helpdesk database module - SQLite-backed tickets, taxonomy, embeddings and notifications
pub mod embedding_store;
pub mod message_store;
pub mod migration;
pub mod notification_store;
pub mod schema;
pub mod taxonomy_store;
pub mod ticket_store;

pub use embedding_store::EmbeddingStore;
pub use message_store::MessageStore;
pub use migration::MigrationManager;
pub use notification_store::NotificationStore;
pub use schema::*;
pub use taxonomy_store::TaxonomyStore;
pub use ticket_store::TicketStore;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) type DbPool = Arc<Pool<SqliteConnectionManager>>;
pub(crate) type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) fn get_conn(pool: &Pool<SqliteConnectionManager>) -> anyhow::Result<PooledConn> {
    pool.get()
        .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
}

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Typed data-access boundary used by the pipeline
pub struct HelpdeskDatabase {
    pub tickets: TicketStore,
    pub taxonomy: TaxonomyStore,
    pub embeddings: EmbeddingStore,
    pub notifications: NotificationStore,
    pub messages: MessageStore,
    pool: DbPool,
}

impl HelpdeskDatabase {
    pub fn new(db_path: &Path, options: &DatabaseOptions) -> anyhow::Result<Self> {
        info!("Opening helpdesk database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_ms = options.busy_timeout.as_millis();
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(move |conn| {
                conn.execute_batch(&format!(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = {};",
                    busy_ms
                ))
            });
        let pool = Pool::builder()
            .max_size(options.pool_size.max(1))
            .connection_timeout(options.busy_timeout.max(Duration::from_secs(1)))
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = get_conn(&pool)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }

        info!("Helpdesk database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Private in-memory database. Uses a single pooled connection because
    /// every SQLite `:memory:` connection is its own database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        {
            let mut conn = get_conn(&pool)?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: DbPool) -> Self {
        Self {
            tickets: TicketStore::new(Arc::clone(&pool)),
            taxonomy: TaxonomyStore::new(Arc::clone(&pool)),
            embeddings: EmbeddingStore::new(Arc::clone(&pool)),
            notifications: NotificationStore::new(Arc::clone(&pool)),
            messages: MessageStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = get_conn(&self.pool)?;
        let count = |table: &str| -> anyhow::Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        };
        Ok(DatabaseStats {
            total_tickets: count("tickets")?,
            total_ticket_embeddings: count("ticket_embeddings")?,
            total_knowledge_chunks: count("knowledge_base_embeddings")?,
            total_notifications: count("notifications")?,
        })
    }
}

impl Drop for HelpdeskDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database_starts_empty() {
        let db = HelpdeskDatabase::new_in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_tickets, 0);
        assert_eq!(stats.total_knowledge_chunks, 0);
    }

    #[test]
    fn test_file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("helpdesk.db");
        let ticket = Ticket::new("org-1", "Printer offline", "The office printer is offline");

        {
            let db = HelpdeskDatabase::new(&path, &DatabaseOptions::default()).unwrap();
            db.tickets.insert_ticket(&ticket).unwrap();
        }

        let reopened = HelpdeskDatabase::new(&path, &DatabaseOptions::default()).unwrap();
        let loaded = reopened.tickets.get_ticket(&ticket.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Printer offline");
        assert_eq!(reopened.get_stats().unwrap().total_tickets, 1);
    }
}
