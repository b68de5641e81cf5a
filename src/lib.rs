//! # genjob
//!
//! Orchestrates long-running media generation jobs against a provider that
//! answers a submission with an operation name and makes you poll for the
//! result.
//!
//! ## Design Philosophy
//!
//! genjob is designed to be:
//! - **Bounded** - Every job ends within `initial_delay + max_attempts × interval`
//! - **Tolerant** - Poll responses change shape; six extraction strategies look for the artifact
//! - **Honest at the boundary** - Only submission failures are errors; everything else is a `failed` descriptor
//! - **Testable** - HTTP client, credentials and clock are injected
//!
//! ## Quick Start
//!
//! ```no_run
//! use genjob::{Config, GenerationRequest, JobHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.provider.project_id = "my-project".to_string();
//!     config.credentials.static_token = Some(std::env::var("ACCESS_TOKEN")?);
//!     config.validate()?;
//!
//!     let handler = JobHandler::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = handler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let descriptor = handler
//!         .run(GenerationRequest::video("a paper boat drifting down a rainy street"))
//!         .await?;
//!     println!("{:?}: {:?}", descriptor.status, descriptor.failure);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Injectable clock
pub mod clock;
/// Configuration types
pub mod config;
/// Bearer credential providers
pub mod credentials;
/// Error types
pub mod error;
/// Artifact extraction strategies
pub mod extract;
/// Job orchestration
pub mod handler;
/// Descriptor construction and artifact storage
pub mod materialize;
/// Operation polling
pub mod poller;
/// Provider HTTP client
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Job submission
pub mod submit;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, Error, ErrorDetail, ExtractionError, FailureReason, MaterializationError, PollError,
    Result, SubmissionError, ToHttpStatus,
};
pub use extract::ResultExtractor;
pub use handler::{JobHandler, RunOptions};
pub use materialize::ArtifactMaterializer;
pub use poller::{OperationPoller, PollOutcome};
pub use submit::JobSubmitter;
pub use types::{
    ArtifactDescriptor, ArtifactStatus, AspectRatio, Event, GenerationKind, GenerationRequest,
    GenerationSettings, JobId, JobPhase, JobStatus, Resolution, SourceStrategy,
};

/// Wait for a termination signal, then shut the handler down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use genjob::{Config, JobHandler, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.credentials.static_token = Some("ya29.token".into());
///     let handler = Arc::new(JobHandler::new(config)?);
///
///     // Cancels in-flight jobs on SIGTERM/SIGINT
///     run_with_shutdown(handler).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(handler: std::sync::Arc<JobHandler>) -> Result<()> {
    wait_for_signal().await;
    handler.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
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
