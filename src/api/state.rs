//! Application state for the API server

use crate::processor::Processor;
use std::sync::Arc;

/// Shared application state accessible to all route handlers.
///
/// Cloned for each request (cheap `Arc` clone); every handler reaches the
/// engine exclusively through [`Processor`]'s own locking.
#[derive(Clone)]
pub struct AppState {
    /// The posting engine instance backing every route
    pub processor: Arc<Processor>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(processor: Arc<Processor>) -> Self {
        Self { processor }
    }
}
