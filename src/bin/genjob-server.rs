//! genjob REST API server
//!
//! Loads configuration from the JSON file named by `GENJOB_CONFIG` (or
//! defaults), applies `GENJOB_*` environment overrides, and serves the API
//! until SIGTERM/SIGINT.
//!
//! After starting, you can:
//! - Run a job via POST http://127.0.0.1:8787/generate
//! - Watch progress via GET http://127.0.0.1:8787/jobs
//! - Stream events via GET http://127.0.0.1:8787/events

use genjob::{Config, JobHandler, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genjob=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match std::env::var("GENJOB_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration");
            Config::from_file(&path)?
        }
        Err(_) => Config::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    tracing::info!(
        provider = %config.provider.base_url,
        project = %config.provider.project_id,
        initial_delay_secs = config.polling.initial_delay.as_secs(),
        interval_secs = config.polling.interval.as_secs(),
        max_attempts = config.polling.max_attempts,
        "Configuration loaded"
    );

    let handler = Arc::new(JobHandler::new(config.clone())?);
    let shutdown_handler = handler.clone();

    genjob::api::start_api_server(handler, Arc::new(config), async move {
        if let Err(e) = run_with_shutdown(shutdown_handler).await {
            tracing::error!(error = %e, "Error during graceful shutdown");
        }
    })
    .await?;

    Ok(())
}
