//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`queue`] — Job listing, enqueuing, and queue-wide pause/resume
//! - [`servers`] — Provider health and connectivity testing
//! - [`config`] — Configuration read/update
//! - [`system`] — Health, events, OpenAPI, shutdown

use serde::{Deserialize, Serialize};

mod config;
mod queue;
mod servers;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use config::*;
pub use queue::*;
pub use servers::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /queue — enqueue a file or folder by path.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct AddJobRequest {
    /// Path to the file, or (with `folder: true`) a directory to post as a
    /// single multi-file job
    pub path: String,
    /// Treat `path` as a folder (posts every regular file inside it as one job)
    #[serde(default)]
    pub folder: bool,
    /// Job priority (default: normal)
    #[serde(default)]
    pub priority: crate::types::Priority,
}

/// Request body for PATCH /queue/:id/priority
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SetPriorityRequest {
    /// New priority for the job
    pub priority: crate::types::Priority,
}
