//! Queue lifecycle and schema migrations.

use crate::error::{Error, QueueError, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::Queue;

impl Queue {
    /// Open (creating if missing) the queue database at `path` and run
    /// migrations up to the current schema version.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::QueueIO(QueueError::OpenFailed(e.to_string())))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::QueueIO(QueueError::OpenFailed(e.to_string())))?;

        let queue = Self { pool };
        queue.run_migrations().await?;
        Ok(queue)
    }

    /// Borrow the underlying connection pool. Only used by tests that want
    /// to pre-seed rows outside the public API.
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::QueueIO(QueueError::OpenFailed(e.to_string())))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: the initial pending/completed/errored schema.
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!(target: "usenet_poster::queue", "applying queue migration v1");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE pending (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    path TEXT NOT NULL UNIQUE,
                    size INTEGER NOT NULL,
                    priority INTEGER NOT NULL DEFAULT 0,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

            sqlx::query(
                r#"
                CREATE TABLE completed (
                    id INTEGER PRIMARY KEY,
                    path TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    priority INTEGER NOT NULL,
                    nzb_path TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    completed_at INTEGER NOT NULL,
                    job_data_blob TEXT
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

            sqlx::query(
                r#"
                CREATE TABLE errored (
                    id INTEGER PRIMARY KEY,
                    path TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    priority INTEGER NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    error_message TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    errored_at INTEGER NOT NULL,
                    job_data_blob TEXT
                )
                "#,
            )
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, strftime('%s','now'))")
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;

            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| Error::QueueIO(QueueError::MigrationFailed(e.to_string())))?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(target: "usenet_poster::queue", "queue migration v1 complete");
        Ok(())
    }
}
