//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`generate`] - Run generation jobs
//! - [`jobs`] - Job progress
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod generate;
mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use generate::*;
pub use jobs::*;
pub use system::*;

/// Query parameters for the generate endpoints
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Query)]
pub struct GenerateQuery {
    /// Give up after this many seconds instead of the configured polling budget
    pub deadline_secs: Option<u64>,
}
