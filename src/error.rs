//! Error types for usenet-poster
//!
//! This module provides the error taxonomy for the library: domain-specific
//! error kinds, HTTP status code mapping for the optional REST front-end, and
//! structured JSON error envelopes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for usenet-poster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-poster
///
/// Each variant carries the context needed to diagnose and, where relevant,
/// retry the failing operation. See [`crate::retry::IsRetryable`] for the
/// retryable/permanent classification of each kind.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is structurally invalid; fatal, surfaced at load.
    #[error("configuration error: {message}")]
    ConfigInvalid {
        /// Human-readable description of the violated constraint
        message: String,
        /// The configuration key that caused the error, if localized to one
        key: Option<String>,
    },

    /// Provider/transport error (TCP, TLS, SOCKS5).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Per-provider authentication failure; demotes the provider.
    #[error("authentication failed for provider '{provider}': {message}")]
    AuthFailure {
        /// The provider's configured identity (host:port)
        provider: String,
        /// Server-reported reason, if any
        message: String,
    },

    /// Permanent server refusal of an article.
    #[error("article rejected by '{provider}': {code} {text}")]
    ArticleRejected {
        /// The provider that rejected the article
        provider: String,
        /// NNTP response code
        code: u16,
        /// NNTP response text
        text: String,
    },

    /// `POST` did not complete within the configured timeout.
    #[error("post timed out for article {message_id} after {elapsed_secs}s")]
    PostTimeout {
        /// The article's message-ID
        message_id: String,
        /// How long the attempt ran before timing out
        elapsed_secs: u64,
    },

    /// Provider signalled rate limiting; transient.
    #[error("rate limited by provider '{provider}'")]
    RateLimited {
        /// The provider that rate-limited the request
        provider: String,
    },

    /// `STAT` returned 430 (or a transport error) for an article expected present.
    #[error("article {message_id} missing on verify (attempt {attempt}/{max_reposts})")]
    VerificationMissing {
        /// The article's message-ID
        message_id: String,
        /// Which repost attempt this is
        attempt: u32,
        /// The configured repost budget
        max_reposts: u32,
    },

    /// PAR2 generation failed.
    #[error("PAR2 generation failed: {0}")]
    Par2Failed(#[from] Par2Error),

    /// Persistent queue storage failure.
    #[error("queue I/O error: {0}")]
    QueueIO(#[from] QueueError),

    /// Post-upload hook execution failed (non-fatal to the job).
    #[error("hook failed: {0}")]
    HookFailed(#[from] HookError),

    /// Operation was cancelled; not reported as an error beyond its scope.
    #[error("cancelled")]
    Cancelled,

    /// Invalid job input (e.g., a zero-byte source file).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// I/O error not otherwise classified.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error (config, job bodies, NZB XML).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLx error not wrapped by [`QueueError`].
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Resource not found (job, provider).
    #[error("not found: {0}")]
    NotFound(String),

    /// Engine is shutting down; not accepting new jobs.
    #[error("shutting down: not accepting new jobs")]
    ShuttingDown,

    /// REST API server error (bind failure, etc.).
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Catch-all for conditions with no dedicated variant.
    #[error("{0}")]
    Other(String),
}

/// Transport-layer errors (C1 provider connection).
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connection could not be established
    #[error("connection to {host}:{port} failed: {reason}")]
    ConnectFailed {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Underlying reason
        reason: String,
    },

    /// TLS handshake failed
    #[error("TLS handshake with {host}:{port} failed: {reason}")]
    TlsFailed {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Underlying reason
        reason: String,
    },

    /// SOCKS5 proxy negotiation failed
    #[error("SOCKS5 proxy {proxy} failed: {reason}")]
    ProxyFailed {
        /// Proxy URL (credentials redacted)
        proxy: String,
        /// Underlying reason
        reason: String,
    },

    /// Connection dropped mid-command
    #[error("connection to provider '{provider}' was reset: {reason}")]
    Reset {
        /// The provider whose connection reset
        provider: String,
        /// Underlying reason
        reason: String,
    },

    /// Pool could not grant a lease before the configured timeout
    #[error("lease timeout after {waited_secs}s waiting for a connection ({kind})")]
    LeaseTimeout {
        /// How long the caller waited
        waited_secs: u64,
        /// Whether the caller wanted a posting or checking connection
        kind: &'static str,
    },
}

/// PAR2 orchestrator errors (C7).
#[derive(Debug, Error)]
pub enum Par2Error {
    /// The external `par2` binary could not be located
    #[error("par2 binary not found in PATH")]
    BinaryNotFound,

    /// The external tool exited with a non-zero status
    #[error("par2 exited with status {status}: {stderr}")]
    ToolFailed {
        /// Process exit status
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// The tool did not finish within its configured timeout
    #[error("par2 timed out after {timeout_secs}s")]
    Timeout {
        /// The configured timeout
        timeout_secs: u64,
    },

    /// Cleanup of temporary PAR2 outputs failed after retrying
    #[error("failed to clean up PAR2 temp output {path}: {reason}")]
    CleanupFailed {
        /// The path that could not be removed
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },
}

/// Persistent queue errors (C9).
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to open or migrate the database
    #[error("failed to open queue database: {0}")]
    OpenFailed(String),

    /// A migration failed to apply
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// A query against the queue failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The referenced job does not exist in any table
    #[error("job {0} not found")]
    JobNotFound(i64),
}

/// Post-upload hook errors (C10).
#[derive(Debug, Error)]
pub enum HookError {
    /// The configured command could not be spawned
    #[error("failed to spawn hook command: {0}")]
    SpawnFailed(String),

    /// The command exited with a non-zero status
    #[error("hook exited with status {status}: {stderr}")]
    NonZeroExit {
        /// Process exit status
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// The command did not finish within its timeout
    #[error("hook timed out after {timeout_secs}s")]
    Timeout {
        /// The configured timeout
        timeout_secs: u64,
    },

    /// The hook's retry budget (`max_retry_duration`) was exhausted
    #[error("hook retry budget exhausted after {elapsed_secs}s")]
    RetryBudgetExhausted {
        /// Total time spent retrying
        elapsed_secs: u64,
    },
}

/// Structured error response for the optional REST front-end.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "job 123 not found",
///     "details": { "job_id": 123 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "not_found", "config_invalid")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional context (job id, provider, byte counts, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional structured details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert domain errors to HTTP status codes for the optional REST front-end.
pub trait ToHttpStatus {
    /// The HTTP status code for this error
    fn status_code(&self) -> u16;
    /// A stable, machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::ConfigInvalid { .. } => 400,
            Error::InvalidJob(_) => 422,
            Error::AuthFailure { .. } => 401,
            Error::ArticleRejected { .. } => 422,
            Error::PostTimeout { .. } => 504,
            Error::RateLimited { .. } => 429,
            Error::VerificationMissing { .. } => 422,
            Error::Par2Failed(_) => 502,
            Error::QueueIO(_) => 500,
            Error::HookFailed(_) => 502,
            Error::Cancelled => 499,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Sqlx(_) => 500,
            Error::NotFound(_) => 404,
            Error::ShuttingDown => 503,
            Error::ApiServerError(_) => 500,
            Error::Transport(_) => 502,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::ConfigInvalid { .. } => "config_invalid",
            Error::InvalidJob(_) => "invalid_job",
            Error::AuthFailure { .. } => "auth_failure",
            Error::ArticleRejected { .. } => "article_rejected",
            Error::PostTimeout { .. } => "post_timeout",
            Error::RateLimited { .. } => "rate_limited",
            Error::VerificationMissing { .. } => "verification_missing",
            Error::Par2Failed(_) => "par2_failed",
            Error::QueueIO(_) => "queue_io",
            Error::HookFailed(_) => "hook_failed",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Sqlx(_) => "database_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Transport(_) => "transport_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::ArticleRejected {
                provider,
                code,
                text,
            } => Some(serde_json::json!({
                "provider": provider,
                "nntp_code": code,
                "nntp_text": text,
            })),
            Error::VerificationMissing {
                message_id,
                attempt,
                max_reposts,
            } => Some(serde_json::json!({
                "message_id": message_id,
                "attempt": attempt,
                "max_reposts": max_reposts,
            })),
            Error::AuthFailure { provider, .. } => Some(serde_json::json!({
                "provider": provider,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
