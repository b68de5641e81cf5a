//! Authentication middleware for the REST API
//!
//! Optional API key authentication via the `X-Api-Key` header. When
//! `ApiConfig::api_key` is set, every request except `GET /health` must
//! carry a matching key or receives `401 Unauthorized`.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Paths reachable without an API key
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Require a valid `X-Api-Key` header
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use genjob::api::auth::require_api_key;
///
/// let api_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(api_key, require_api_key));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing X-Api-Key header"),
    }
}

/// Compares every byte regardless of where the first mismatch is
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        (StatusCode::OK, "ok")
    }

    fn app(api_key: Option<&str>) -> Router {
        Router::new()
            .route("/jobs", get(ok_handler))
            .route("/health", get(ok_handler))
            .layer(middleware::from_fn_with_state(
                api_key.map(str::to_string),
                require_api_key,
            ))
    }

    async fn status_for(app: Router, uri: &str, key: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header("X-Api-Key", key);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_no_api_key_configured() {
        assert_eq!(status_for(app(None), "/jobs", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_valid_api_key() {
        assert_eq!(
            status_for(app(Some("secret")), "/jobs", Some("secret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_invalid_and_missing_api_key() {
        assert_eq!(
            status_for(app(Some("secret")), "/jobs", Some("Secret")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(app(Some("secret")), "/jobs", Some("secret ")).await,
            StatusCode::UNAUTHORIZED
        );

        let response = app(Some("secret"))
            .oneshot(Request::builder().uri("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "unauthorized");
        assert_eq!(json["error"]["message"], "Missing X-Api-Key header");
    }

    #[tokio::test]
    async fn test_health_is_exempt() {
        assert_eq!(
            status_for(app(Some("secret")), "/health", None).await,
            StatusCode::OK
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
