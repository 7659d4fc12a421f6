//! Transitions out of `pending`: completion, errors, retry, and removal.

use crate::error::{Error, QueueError, Result};
use crate::types::JobId;

use super::{encode_job_blob, CompletedRow, ErroredRow, FileJob, Queue, QueueStats};

impl Queue {
    /// Record a job as completed. The caller is responsible for having
    /// already removed the row from `pending` (normally via
    /// [`Queue::receive`]).
    pub async fn complete(&self, id: JobId, nzb_path: &str, job: &FileJob) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let path = job.path.to_string_lossy().into_owned();
        let blob = encode_job_blob(job);

        sqlx::query(
            r#"
            INSERT INTO completed (id, path, size, priority, nzb_path, created_at, completed_at, job_data_blob)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&path)
        .bind(job.size as i64)
        .bind(job.priority.to_i32())
        .bind(nzb_path)
        .bind(now)
        .bind(now)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// Record a job as errored.
    pub async fn mark_error(&self, id: JobId, job: &FileJob, message: &str, retry_count: u32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let path = job.path.to_string_lossy().into_owned();
        let blob = encode_job_blob(job);

        sqlx::query(
            r#"
            INSERT INTO errored (id, path, size, priority, retry_count, error_message, created_at, errored_at, job_data_blob)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&path)
        .bind(job.size as i64)
        .bind(job.priority.to_i32())
        .bind(retry_count as i32)
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// Move an errored job back to `pending`, resetting `retry_count` to 0.
    pub async fn retry_errored(&self, id: JobId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let row: Option<ErroredRow> = sqlx::query_as(
            r#"
            SELECT id, path, size, priority, retry_count, error_message, created_at, errored_at, job_data_blob
            FROM errored WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        let Some(row) = row else {
            return Err(Error::QueueIO(QueueError::JobNotFound(id.get())));
        };

        sqlx::query("DELETE FROM errored WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        sqlx::query(
            r#"
            INSERT INTO pending (id, path, size, priority, retry_count, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(id)
        .bind(&row.path)
        .bind(row.size)
        .bind(row.priority)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        tx.commit()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// Remove a job by id from whichever table it currently lives in.
    pub async fn remove(&self, id: JobId) -> Result<()> {
        for table in ["pending", "completed", "errored"] {
            let sql = format!("DELETE FROM {table} WHERE id = ?");
            sqlx::query(&sql)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;
        }
        Ok(())
    }

    /// Delete every row in every table.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        for table in ["pending", "completed", "errored"] {
            let sql = format!("DELETE FROM {table}");
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(())
    }

    /// Row counts across `pending`/`completed`/`errored`. `running` is
    /// always 0 here; the processor fills it in from its own in-memory set.
    pub async fn stats(&self) -> Result<QueueStats> {
        let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;
        let complete: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM completed")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;
        let error: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM errored")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))?;

        Ok(QueueStats {
            pending,
            running: 0,
            complete,
            error,
        })
    }

    /// List completed jobs, most recent first.
    pub async fn list_completed(&self) -> Result<Vec<CompletedRow>> {
        sqlx::query_as(
            r#"
            SELECT id, path, size, priority, nzb_path, created_at, completed_at, job_data_blob
            FROM completed
            ORDER BY completed_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))
    }

    /// List errored jobs, most recent first.
    pub async fn list_errored(&self) -> Result<Vec<ErroredRow>> {
        sqlx::query_as(
            r#"
            SELECT id, path, size, priority, retry_count, error_message, created_at, errored_at, job_data_blob
            FROM errored
            ORDER BY errored_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::QueueIO(QueueError::QueryFailed(e.to_string())))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use std::path::PathBuf;

    fn job(path: &str) -> FileJob {
        FileJob {
            path: PathBuf::from(path),
            size: 1000,
            priority: Priority::Normal,
        }
    }

    async fn open_test_queue() -> Queue {
        Queue::open(&PathBuf::from(format!(
            "file:memdb_queue_{}?mode=memory&cache=shared",
            uuid_like()
        )))
        .await
        .unwrap()
    }

    // Avoids pulling in a uuid crate for test-only uniqueness.
    fn uuid_like() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    #[tokio::test]
    async fn add_file_is_idempotent() {
        let queue = open_test_queue().await;
        let id1 = queue.add_file(job("/data/a.bin")).await.unwrap();
        let id2 = queue.add_file(job("/data/a.bin")).await.unwrap();
        assert_eq!(id1, id2);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn receive_dequeues_highest_priority_first() {
        let queue = open_test_queue().await;
        queue
            .add_file(FileJob {
                path: PathBuf::from("/data/low.bin"),
                size: 1,
                priority: Priority::Low,
            })
            .await
            .unwrap();
        queue
            .add_file(FileJob {
                path: PathBuf::from("/data/high.bin"),
                size: 1,
                priority: Priority::High,
            })
            .await
            .unwrap();

        let (_, received) = queue.receive().await.unwrap().unwrap();
        assert_eq!(received.path, PathBuf::from("/data/high.bin"));
    }

    #[tokio::test]
    async fn receive_removes_row_from_pending() {
        let queue = open_test_queue().await;
        queue.add_file(job("/data/a.bin")).await.unwrap();
        queue.receive().await.unwrap();
        assert_eq!(queue.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn complete_then_mark_error_round_trip() {
        let queue = open_test_queue().await;
        let id = queue.add_file(job("/data/a.bin")).await.unwrap();
        let (_, file_job) = queue.receive().await.unwrap().unwrap();
        queue.complete(id, "/out/a.nzb", &file_job).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn mark_error_then_retry_errored_moves_back_to_pending() {
        let queue = open_test_queue().await;
        let id = queue.add_file(job("/data/a.bin")).await.unwrap();
        let (_, file_job) = queue.receive().await.unwrap().unwrap();
        queue
            .mark_error(id, &file_job, "transport failure", 1)
            .await
            .unwrap();
        assert_eq!(queue.stats().await.unwrap().error, 1);

        queue.retry_errored(id).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.error, 0);
        assert_eq!(stats.pending, 1);

        let pending = queue.list_pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn remove_deletes_from_any_table() {
        let queue = open_test_queue().await;
        let id = queue.add_file(job("/data/a.bin")).await.unwrap();
        queue.remove(id).await.unwrap();
        assert_eq!(queue.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn clear_all_empties_every_table() {
        let queue = open_test_queue().await;
        let id = queue.add_file(job("/data/a.bin")).await.unwrap();
        let (_, file_job) = queue.receive().await.unwrap().unwrap();
        queue.complete(id, "/out/a.nzb", &file_job).await.unwrap();
        queue.add_file(job("/data/b.bin")).await.unwrap();

        queue.clear_all().await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.complete, 0);
        assert_eq!(stats.error, 0);
    }

    #[tokio::test]
    async fn set_priority_reorders_dequeue() {
        let queue = open_test_queue().await;
        let low_id = queue
            .add_file(FileJob {
                path: PathBuf::from("/data/low.bin"),
                size: 1,
                priority: Priority::Low,
            })
            .await
            .unwrap();
        queue
            .add_file(FileJob {
                path: PathBuf::from("/data/normal.bin"),
                size: 1,
                priority: Priority::Normal,
            })
            .await
            .unwrap();

        queue.set_priority(low_id, Priority::High).await.unwrap();
        let (_, received) = queue.receive().await.unwrap().unwrap();
        assert_eq!(received.path, PathBuf::from("/data/low.bin"));
    }
}
