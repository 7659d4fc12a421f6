//! Retry logic with exponential backoff
//!
//! This module provides the single exponential-backoff-with-jitter combinator
//! used by the Poster's per-article retry, the Verifier's repost scheduling,
//! and the Processor's post-upload hook retries.
//!
//! # Example
//!
//! ```no_run
//! use usenet_poster::retry::{IsRetryable, with_retry};
//! use usenet_poster::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, HookError, Par2Error, QueueError, TransportError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not.
///
/// Transient failures (network timeouts, rate limiting, connection reset)
/// should return `true`. Permanent failures (bad auth, rejected article,
/// invalid configuration) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            Error::RateLimited { .. } => true,
            Error::PostTimeout { .. } => true,
            Error::VerificationMissing { .. } => true,
            Error::Par2Failed(e) => e.is_retryable(),
            Error::QueueIO(e) => e.is_retryable(),
            Error::HookFailed(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Permanent: nothing about retrying changes the outcome.
            Error::ConfigInvalid { .. }
            | Error::AuthFailure { .. }
            | Error::ArticleRejected { .. }
            | Error::InvalidJob(_)
            | Error::Serialization(_)
            | Error::Sqlx(_)
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::ApiServerError(_)
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectFailed { .. }
            | TransportError::TlsFailed { .. }
            | TransportError::ProxyFailed { .. }
            | TransportError::Reset { .. }
            | TransportError::LeaseTimeout { .. } => true,
        }
    }
}

impl IsRetryable for Par2Error {
    fn is_retryable(&self) -> bool {
        match self {
            Par2Error::Timeout { .. } => true,
            Par2Error::BinaryNotFound | Par2Error::ToolFailed { .. } => false,
            // Filesystem locks holding briefly is the documented reason for
            // this cleanup path to retry.
            Par2Error::CleanupFailed { .. } => true,
        }
    }
}

impl IsRetryable for QueueError {
    fn is_retryable(&self) -> bool {
        match self {
            QueueError::QueryFailed(_) => true,
            QueueError::OpenFailed(_) | QueueError::MigrationFailed(_) | QueueError::JobNotFound(_) => {
                false
            }
        }
    }
}

impl IsRetryable for HookError {
    fn is_retryable(&self) -> bool {
        match self {
            HookError::Timeout { .. } | HookError::NonZeroExit { .. } => true,
            HookError::SpawnFailed(_) | HookError::RetryBudgetExhausted { .. } => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic.
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let jittered_delay = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd.
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay is between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
