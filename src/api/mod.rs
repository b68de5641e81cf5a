//! REST API server module
//!
//! Exposes the job handler over HTTP: run a generation job and receive its
//! descriptor, poll coarse progress, stream events.

use crate::{Config, JobHandler, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Generation
/// - `POST /generate` - Run a job (kind from the body, default video)
/// - `POST /generate/video` - Run a video job
/// - `POST /generate/image` - Run an image job
///
/// Each returns the job's descriptor once it finishes. A job that ran but
/// produced nothing is still `200` with `status: "failed"`; only submission
/// failures are HTTP errors. Closing the connection cancels the job.
///
/// ## Jobs
/// - `GET /jobs` - Progress of tracked jobs
/// - `GET /jobs/:id` - Progress of one job
///
/// ## System
/// - `GET /health` - Health check (never requires an API key)
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(handler: Arc<JobHandler>, config: Arc<Config>) -> Router {
    let state = AppState::new(handler, config.clone());

    let router = Router::new()
        // Generation
        .route("/generate", post(routes::generate))
        .route("/generate/video", post(routes::generate_video))
        .route("/generate/image", post(routes::generate_image))
        // Jobs
        .route("/jobs", get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi serves its own copy of the spec
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Last layer applied is outermost: Trace → CORS → Auth → Handler
    let router = if config.server.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on the configured bind address until `shutdown` resolves
///
/// After `shutdown` resolves the listener closes and in-flight requests are
/// allowed to finish.
///
/// # Example
///
/// ```no_run
/// use genjob::{Config, JobHandler};
/// use std::sync::Arc;
///
/// # async fn example() -> genjob::Result<()> {
/// let mut config = Config::default();
/// config.credentials.static_token = Some("ya29.token".into());
/// let config = Arc::new(config);
/// let handler = Arc::new(JobHandler::new((*config).clone())?);
///
/// genjob::api::start_api_server(handler, config, std::future::pending()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server<F>(
    handler: Arc<JobHandler>,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(handler, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
