//! Application state for the API server

use crate::{Config, JobHandler};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The job handler every generation request goes through
    pub handler: Arc<JobHandler>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(handler: Arc<JobHandler>, config: Arc<Config>) -> Self {
        Self { handler, config }
    }
}
