//! Database context: owns the connection factory and hands out repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_archival::DieselArchivalRepository;
use super::diesel_blacklist::DieselBlacklistRepository;
use super::diesel_pool::{AsyncSqlitePool, DieselError};

/// Entry point for all ledger and blacklist storage.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:/var/lib/archiver/archiver.db");
/// ctx.init_schema().await?;
/// let latest = ctx.archivals().get_for_resource(&resource_id).await?;
/// ```
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: AsyncSqlitePool,
}

impl DbContext {
    /// Create a new database context from a file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: AsyncSqlitePool::from_path(db_path),
        }
    }

    /// Create a new database context from a `sqlite:` URL or path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: AsyncSqlitePool::new(database_url),
        }
    }

    /// Get the underlying connection factory.
    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }

    /// Get the archival ledger repository.
    pub fn archivals(&self) -> DieselArchivalRepository {
        DieselArchivalRepository::new(self.pool.clone())
    }

    /// Get the blacklist repository.
    pub fn blacklist(&self) -> DieselBlacklistRepository {
        DieselBlacklistRepository::new(self.pool.clone())
    }

    /// Create tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            -- Latest archival attempt per resource
            CREATE TABLE IF NOT EXISTS archival (
                resource_id TEXT PRIMARY KEY,
                dataset_id TEXT NOT NULL,
                status_id INTEGER NOT NULL,
                reason TEXT,
                url_redirected_to TEXT,
                content_path TEXT,
                content_address TEXT,
                size BIGINT,
                mime_type TEXT,
                content_hash TEXT,
                etag TEXT,
                last_modified TEXT,
                request_type TEXT,
                first_failure_at TEXT,
                last_success_at TEXT,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_archival_dataset ON archival(dataset_id);
            CREATE INDEX IF NOT EXISTS idx_archival_updated ON archival(updated_at);

            -- Failure counters per URL prefix
            CREATE TABLE IF NOT EXISTS url_blacklist (
                prefix TEXT PRIMARY KEY,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .await
    }
}
