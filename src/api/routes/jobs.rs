//! Job progress handlers.

use crate::api::AppState;
use crate::error::ApiError;
use crate::types::JobId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /jobs - List tracked jobs, oldest first
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Progress of every tracked job", body = Vec<crate::types::JobStatus>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.handler.list_jobs().await))
}

/// GET /jobs/:id - Progress of one job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID (UUID)")
    ),
    responses(
        (status = 200, description = "Job progress", body = crate::types::JobStatus),
        (status = 404, description = "Job not found", body = ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match state.handler.job_status(id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => ApiError::not_found(format!("job {id}")).into_response(),
    }
}
