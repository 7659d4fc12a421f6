//! Core shared types for usenet-poster

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a posting job.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<JobId> for i64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for JobId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<JobId> for i64 {
    fn eq(&self, other: &JobId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Derived job status: which table a job currently lives in, or its running sub-state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Sitting in the `pending` table, not yet dequeued
    Pending,
    /// Dequeued and actively being processed
    Running,
    /// Moved to the `completed` table
    Complete,
    /// Moved to the `errored` table
    Error,
}

impl Status {
    /// Convert an integer status code to a `Status`. Unknown codes fall back to `Pending`.
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Running,
            2 => Status::Complete,
            3 => Status::Error,
            _ => Status::Pending,
        }
    }

    /// Convert a `Status` to its integer code for persistence.
    pub fn to_i32(self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Running => 1,
            Status::Complete => 2,
            Status::Error => 3,
        }
    }
}

/// Job priority. Higher values are processed first within the pending table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Processed after Normal and High
    Low,
    /// Default priority
    Normal,
    /// Processed before Normal and Low
    High,
}

impl Priority {
    /// Convert an integer priority to a `Priority`. Unknown values fall back to `Normal`.
    pub fn from_i32(priority: i32) -> Self {
        match priority {
            -1 => Priority::Low,
            0 => Priority::Normal,
            1 => Priority::High,
            _ => Priority::Normal,
        }
    }

    /// Convert a `Priority` to its integer code for persistence and ordering.
    pub fn to_i32(self) -> i32 {
        match self {
            Priority::Low => -1,
            Priority::Normal => 0,
            Priority::High => 1,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// One progress entry within a [`RunningJobDetails`], covering uploading, PAR2
/// generation, or post-upload checking.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressEntry {
    /// Which phase of the job this entry tracks
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    /// Human-readable description (e.g. file name, PAR2 volume index)
    pub description: String,
    /// Bytes processed so far
    pub current_bytes: u64,
    /// Total bytes expected
    pub total_bytes: u64,
    /// Percent complete, 0.0-100.0
    pub percent: f32,
    /// Seconds elapsed since this phase started
    pub seconds_elapsed: u64,
    /// Estimated seconds remaining, if calculable
    pub seconds_left: Option<u64>,
    /// Current throughput in kilobytes per second
    pub kbps: f64,
    /// Whether this phase has started
    pub is_started: bool,
    /// Whether this phase is currently paused
    pub is_paused: bool,
}

/// Which phase of a job a [`ProgressEntry`] tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Posting articles to NNTP providers
    Uploading,
    /// Generating PAR2 recovery volumes
    Par2Generation,
    /// Verifying posted articles via STAT
    Checking,
}

/// Snapshot of a currently-running job, for the processor's status API.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RunningJobDetails {
    /// The job's persistent id
    pub job_id: JobId,
    /// Display name (typically the file or folder name)
    pub file_name: String,
    /// Total size in bytes of the source file(s)
    pub size: u64,
    /// Source path (or `FOLDER:` prefixed path for folder-mode jobs)
    pub path: PathBuf,
    /// Progress entries, one per active phase
    pub progress_list: Vec<ProgressEntry>,
}

/// Derived view of a queue row, used by listing APIs. Status is derived from
/// which table the row lives in, never stored redundantly.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueItem {
    /// Persistent job id
    pub id: JobId,
    /// Source path (or folder pseudo-path)
    pub path: PathBuf,
    /// Display file name
    pub file_name: String,
    /// Total size in bytes
    pub size: u64,
    /// Derived status
    pub status: Status,
    /// Number of times this job has been retried after an error
    pub retry_count: u32,
    /// Job priority
    pub priority: Priority,
    /// Error message, if the job is in `errored`
    pub error_message: Option<String>,
    /// When the job was first enqueued
    pub created_at: DateTime<Utc>,
    /// When the job's row was last updated
    pub updated_at: DateTime<Utc>,
    /// When the job completed, if it has
    pub completed_at: Option<DateTime<Utc>>,
    /// Path to the generated NZB, if the job completed successfully
    pub nzb_path: Option<PathBuf>,
}

/// Lifecycle and operational events emitted by the engine.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A file or folder was added to the pending queue
    Queued {
        /// The new job's id
        id: JobId,
        /// Display name
        name: String,
    },
    /// A job was dequeued and processing started
    Started {
        /// The job's id
        id: JobId,
        /// Display name
        name: String,
    },
    /// An article was successfully posted
    ArticlePosted {
        /// The job this article belongs to
        job_id: JobId,
        /// The article's message-ID
        message_id: String,
        /// 1-based part number within its file
        part_number: u32,
    },
    /// An article was reposted after a failed verification
    ArticleReposted {
        /// The job this article belongs to
        job_id: JobId,
        /// The article's message-ID (the new, successful one)
        message_id: String,
        /// Which repost attempt this was
        attempt: u32,
    },
    /// A job completed successfully
    Completed {
        /// The job's id
        id: JobId,
        /// Path to the generated NZB
        nzb_path: PathBuf,
    },
    /// A job failed and was moved to the errored table
    Errored {
        /// The job's id
        id: JobId,
        /// The error message recorded
        message: String,
    },
    /// PAR2 generation failed in parallel mode; the job still completed, but
    /// without recovery data.
    Par2Degraded {
        /// The job's id
        id: JobId,
        /// The reason PAR2 generation failed
        reason: String,
    },
    /// A provider was demoted after an authentication failure
    ProviderDemoted {
        /// The provider's identity (host:port)
        provider: String,
        /// How long the demotion lasts, in seconds
        backoff_secs: u64,
    },
    /// The processor was paused (by user request or auto-pause)
    Paused {
        /// The reason for the pause, if auto-paused
        reason: Option<String>,
    },
    /// The processor was resumed
    Resumed,
}

/// Which pool a verifier's `STAT` calls were drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckedAgainst {
    /// A dedicated `check_only` provider set, distinct from posting
    Dedicated,
    /// The checking pool aliased the posting pool (no dedicated checkers configured)
    PostingFallback,
}

/// Which logical pool(s) a provider currently participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    /// Posting pool only
    Posting,
    /// Check-only pool only
    CheckOnly,
    /// Both pools (the sole provider, aliased into both)
    Both,
}

/// Point-in-time health snapshot of one provider's connection bucket, for
/// the REST front-end's provider health endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderHealth {
    /// The provider's identity (`host:port`)
    pub provider: String,
    /// Which pool(s) this provider serves
    pub role: ProviderRole,
    /// Configured connection cap
    pub max_connections: usize,
    /// Connections currently leased out
    pub active_connections: usize,
    /// Whether the provider is currently in a back-off window
    pub backed_off: bool,
}

/// Outcome of a one-shot connectivity probe against a provider, used by the
/// REST front-end's "test server" endpoint. Does not consume a pool lease.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderTestResult {
    /// The provider's identity (`host:port`)
    pub provider: String,
    /// Whether connect (and, if configured, authenticate) succeeded
    pub success: bool,
    /// Human-readable outcome detail
    pub message: String,
    /// Round-trip time for the connect attempt, in milliseconds
    pub latency_ms: Option<u64>,
}

/// One record per successfully placed article, accumulated by the NZB builder.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NzbRecord {
    /// Subject line for this article
    pub subject: String,
    /// From header
    pub from: String,
    /// Post date
    pub date: DateTime<Utc>,
    /// Newsgroups this article was posted to
    pub groups: Vec<String>,
    /// Poster identity (duplicated into the NZB `poster` attribute)
    pub poster: String,
    /// The (possibly obfuscated) file name this article belongs to
    pub file_name: String,
    /// 1-based part number within the file
    pub part_number: u32,
    /// Total parts for the file
    pub total_parts: u32,
    /// The message-ID the server accepted
    pub message_id: String,
    /// Size of this article's body in bytes
    pub byte_count: u64,
    /// CRC32 of the pre-encoded segment bytes, if known
    pub crc32: Option<u32>,
}
