//! # usenet-poster
//!
//! A Usenet binary posting engine: segments files, yEnc-encodes them,
//! posts articles across a pool of NNTP providers, verifies propagation via
//! `STAT` (reposting on miss), generates PAR2 recovery volumes, and assembles
//! the result into an NZB.
//!
//! ## Design Philosophy
//!
//! - **Highly configurable** - almost every behavior can be customized
//! - **Sensible defaults** - works out of the box with a single provider
//! - **Library-first** - the REST API in [`api`] is optional; [`processor::Processor`]
//!   is usable standalone
//! - **Event-driven** - consumers subscribe to [`types::Event`], no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use usenet_poster::{Config, Queue, Processor, run_with_shutdown};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         providers: vec![usenet_poster::config::ProviderConfig {
//!             host: "news.example.com".to_string(),
//!             username: Some("user".to_string()),
//!             password: Some("pass".to_string()),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     };
//!     config.validate()?;
//!
//!     let queue = Queue::open(&config.queue.database_path).await?;
//!     let processor = Arc::new(Processor::new(config, queue, CancellationToken::new())?);
//!
//!     let mut events = processor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(processor).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API surface (queue inspection, pause/resume, provider health, SSE events)
pub mod api;
/// Article model and message-ID/obfuscation generation
pub mod article;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// NZB XML assembly and compression
pub mod nzb;
/// PAR2 recovery volume generation
pub mod par2;
/// Per-provider connection pooling
pub mod pool;
/// Article posting pipeline
pub mod poster;
/// Job dequeue loop and pipeline orchestration
pub mod processor;
/// NNTP connection primitives (connect, POST, STAT)
pub mod provider;
/// Persistent job queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// File segmentation and yEnc encoding
pub mod segmenter;
/// Speed limiting with token bucket
pub mod speed_limiter;
/// Core types and events
pub mod types;
/// Post-upload `STAT` verification and repost-on-miss
pub mod verifier;
/// Directory watcher for automatic job enqueue
pub mod watcher;
/// yEnc single-pass encoder
pub mod yenc;

// Re-export commonly used types
pub use config::{Config, ConfigUpdate};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use processor::Processor;
pub use queue::{FileJob, Queue, QueueStats};
pub use types::{
    CheckedAgainst, Event, JobId, Priority, ProgressEntry, ProgressKind, QueueItem,
    RunningJobDetails, Status,
};

/// Helper function to run the processor with graceful signal handling.
///
/// Spawns the dequeue loop, waits for a termination signal, then signals
/// shutdown and waits for the current iteration to observe it. Jobs already
/// in flight run to completion; `shutdown()` does not abort them.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use usenet_poster::{Config, Queue, Processor, run_with_shutdown};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let queue = Queue::open(&config.queue.database_path).await?;
///     let processor = Arc::new(Processor::new(config, queue, CancellationToken::new())?);
///
///     run_with_shutdown(processor).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(processor: std::sync::Arc<Processor>) -> Result<()> {
    let run_handle = tokio::spawn(processor.clone().run());
    wait_for_signal().await;
    processor.shutdown();
    run_handle
        .await
        .map_err(|e| Error::Other(format!("processor task panicked: {e}")))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
