//! Enqueue and dequeue operations on the `pending` table.

use crate::error::{Error, QueueError, Result};
use crate::types::{JobId, Priority};

use super::{FileJob, PendingRow, Queue};

impl Queue {
    /// Insert a new job, idempotently.
    ///
    /// Checks the union of `pending`/`completed`/`errored` for the same
    /// path; if present, returns the existing id without inserting a
    /// duplicate row.
    pub async fn add_file(&self, job: FileJob) -> Result<JobId> {
        let path = job.path.to_string_lossy().into_owned();

        if let Some(existing) = self.find_by_path(&path).await? {
            return Ok(existing);
        }

        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO pending (path, size, priority, retry_count, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(&path)
        .bind(job.size as i64)
        .bind(job.priority.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(JobId::new(result.last_insert_rowid()))
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<JobId>> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM pending WHERE path = ?
            UNION ALL
            SELECT id FROM completed WHERE path = ?
            UNION ALL
            SELECT id FROM errored WHERE path = ?
            LIMIT 1
            "#,
        )
        .bind(path)
        .bind(path)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(id.map(JobId::new))
    }

    /// Atomically lease the next pending job, highest priority first, ties
    /// broken by insertion order. The row is removed from `pending` as part
    /// of the same transaction: if the caller cannot process it, it must
    /// re-enqueue it itself (e.g. via [`Queue::add_file`] or
    /// [`Queue::requeue`]).
    pub async fn receive(&self) -> Result<Option<(JobId, FileJob)>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let row: Option<PendingRow> = sqlx::query_as(
            r#"
            SELECT id, path, size, priority, retry_count, created_at
            FROM pending
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let Some(row) = row else {
            tx.commit()
                .await
                .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM pending WHERE id = ?")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        tx.commit()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let job = row.job();
        Ok(Some((row.id, job)))
    }

    /// Re-insert a job into `pending`, preserving its id. Used to restore a
    /// job that was dequeued via [`Queue::receive`] but could not be
    /// processed (e.g. the processor is shutting down).
    pub async fn requeue(&self, id: JobId, job: &FileJob, retry_count: u32) -> Result<()> {
        let path = job.path.to_string_lossy().into_owned();
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO pending (id, path, size, priority, retry_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&path)
        .bind(job.size as i64)
        .bind(job.priority.to_i32())
        .bind(retry_count as i32)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// Change a pending job's priority. A no-op if the id is not currently pending.
    pub async fn set_priority(&self, id: JobId, priority: Priority) -> Result<()> {
        sqlx::query("UPDATE pending SET priority = ? WHERE id = ?")
            .bind(priority.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// List all pending rows, in dequeue order.
    pub async fn list_pending(&self) -> Result<Vec<PendingRow>> {
        sqlx::query_as(
            r#"
            SELECT id, path, size, priority, retry_count, created_at
            FROM pending
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))
    }
}
