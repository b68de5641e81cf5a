//! Generation handlers.

use super::GenerateQuery;
use crate::api::AppState;
use crate::error::Error;
use crate::handler::RunOptions;
use crate::types::{GenerationKind, GenerationRequest};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// POST /generate - Run a generation job (kind taken from the body, default video)
#[utoipa::path(
    post,
    path = "/generate",
    tag = "generate",
    params(GenerateQuery),
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Job finished; check `status` for completed or failed", body = crate::types::ArtifactDescriptor),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 422, description = "Provider refused the request", body = crate::error::ApiError),
        (status = 502, description = "Provider rejected or unreachable at submission", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn generate(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    run_job(state, request, query).await
}

/// POST /generate/video - Run a video generation job
#[utoipa::path(
    post,
    path = "/generate/video",
    tag = "generate",
    params(GenerateQuery),
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Job finished; check `status` for completed or failed", body = crate::types::ArtifactDescriptor),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Provider rejected or unreachable at submission", body = crate::error::ApiError)
    )
)]
pub async fn generate_video(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    Json(mut request): Json<GenerationRequest>,
) -> Response {
    request.kind = GenerationKind::Video;
    run_job(state, request, query).await
}

/// POST /generate/image - Run an image generation job
#[utoipa::path(
    post,
    path = "/generate/image",
    tag = "generate",
    params(GenerateQuery),
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Job finished; check `status` for completed or failed", body = crate::types::ArtifactDescriptor),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 502, description = "Provider rejected or unreachable at submission", body = crate::error::ApiError)
    )
)]
pub async fn generate_image(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    Json(mut request): Json<GenerationRequest>,
) -> Response {
    request.kind = GenerationKind::Image;
    run_job(state, request, query).await
}

/// Runs the job on its own task; a dropped request cancels it through the guard
async fn run_job(state: AppState, request: GenerationRequest, query: GenerateQuery) -> Response {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let options = RunOptions {
        cancel: Some(cancel),
        deadline: query.deadline_secs.map(Duration::from_secs),
    };
    let handler = state.handler.clone();
    let job = tokio::spawn(async move { handler.run_with(request, options).await });

    match job.await {
        Ok(Ok(descriptor)) => (StatusCode::OK, Json(descriptor)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "generation task panicked");
            Error::Other(format!("generation task failed: {e}")).into_response()
        }
    }
}
