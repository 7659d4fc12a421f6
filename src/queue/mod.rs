//! Persistent queue (C9): the durable store behind the posting pipeline.
//!
//! Three logical tables back [`Status`](crate::types::Status): `pending` (the
//! active queue, ordered by `(priority DESC, created_at ASC)`), `completed`
//! (one immutable row per finished job), and `errored` (one row per job that
//! failed and was not retried yet). A job's id is stable across all three
//! tables so callers can track one job end to end. Running jobs are not a
//! table here — the [`crate::processor`] owns that count in memory.
//!
//! Organized the way the corpus splits its database layer by domain:
//! [`migrations`] for lifecycle/schema, [`pending`] for enqueue/dequeue,
//! [`lifecycle`] for the completed/errored transitions.

mod lifecycle;
mod migrations;
mod pending;

use crate::types::{JobId, Priority};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// The durable unit of work behind one queue row: enough to re-derive a
/// [`crate::segmenter::Segmenter`] and an NZB output path without touching
/// the filesystem first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileJob {
    /// Source path (or a `FOLDER:`-prefixed pseudo-path in folder mode)
    pub path: PathBuf,
    /// Total size in bytes of the source file(s)
    pub size: u64,
    /// Job priority, persisted alongside the row for forward-compatible replay
    pub priority: Priority,
}

/// A row currently sitting in `pending`.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PendingRow {
    /// Job id, stable across pending/completed/errored
    pub id: JobId,
    /// Source path
    pub path: String,
    /// Total size in bytes
    pub size: i64,
    /// Integer-encoded priority (see [`Priority::to_i32`])
    pub priority: i32,
    /// How many times this job has previously been retried after an error
    pub retry_count: i32,
    /// Unix timestamp the job was first enqueued
    pub created_at: i64,
}

/// An immutable record of a finished job.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CompletedRow {
    /// Job id
    pub id: JobId,
    /// Source path
    pub path: String,
    /// Total size in bytes
    pub size: i64,
    /// Integer-encoded priority
    pub priority: i32,
    /// Path to the generated NZB
    pub nzb_path: String,
    /// Unix timestamp the job was first enqueued
    pub created_at: i64,
    /// Unix timestamp the job completed
    pub completed_at: i64,
    /// Serialized [`FileJob`] for forward-compatible replay
    pub job_data_blob: Option<String>,
}

/// A record of a job that failed and has not been retried.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ErroredRow {
    /// Job id
    pub id: JobId,
    /// Source path
    pub path: String,
    /// Total size in bytes
    pub size: i64,
    /// Integer-encoded priority
    pub priority: i32,
    /// How many times this job has previously been retried after an error
    pub retry_count: i32,
    /// The error message recorded when the job failed
    pub error_message: String,
    /// Unix timestamp the job was first enqueued
    pub created_at: i64,
    /// Unix timestamp the job errored
    pub errored_at: i64,
    /// Serialized [`FileJob`] for forward-compatible replay
    pub job_data_blob: Option<String>,
}

/// Row counts across the three tables. Running jobs are not stored here —
/// the processor overlays its own in-memory count.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStats {
    /// Rows in `pending`
    pub pending: i64,
    /// Jobs currently being processed (filled in by the processor, not the queue)
    pub running: i64,
    /// Rows in `completed`
    pub complete: i64,
    /// Rows in `errored`
    pub error: i64,
}

/// The persistent job queue. Cheap to clone: wraps a pooled `SqlitePool`.
#[derive(Clone)]
pub struct Queue {
    pool: SqlitePool,
}

pub(crate) fn encode_job_blob(job: &FileJob) -> Option<String> {
    serde_json::to_string(job).ok()
}

pub(crate) fn decode_job_blob(blob: Option<&str>) -> Option<FileJob> {
    blob.and_then(|b| serde_json::from_str(b).ok())
}

impl PendingRow {
    /// Reconstruct the [`FileJob`] this row represents.
    pub fn job(&self) -> FileJob {
        FileJob {
            path: PathBuf::from(&self.path),
            size: self.size as u64,
            priority: Priority::from_i32(self.priority),
        }
    }
}
