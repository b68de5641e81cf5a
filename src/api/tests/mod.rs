use super::*;
use crate::clock::ManualClock;
use crate::credentials::StaticCredential;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod generate;
mod system;

/// Config pointed at a mock provider
fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.provider.base_url = server.uri();
    config.provider.project_id = "demo".into();
    config.credentials.static_token = Some("tok".into());
    config
}

/// Handler on virtual time, so the two-minute initial delay costs nothing
fn test_handler(config: &Config) -> Arc<JobHandler> {
    Arc::new(
        JobHandler::with_parts(
            config.clone(),
            Arc::new(StaticCredential::new("tok")),
            Arc::new(ManualClock::new()),
        )
        .unwrap(),
    )
}

fn test_app(config: Config) -> (Router, Arc<JobHandler>) {
    let handler = test_handler(&config);
    (create_router(handler.clone(), Arc::new(config)), handler)
}

/// Provider that accepts every submission and finishes on the first poll
async fn mount_finished_operation(server: &MockServer, operation: &str, bytes: &[u8]) {
    Mock::given(method("POST"))
        .and(path_regex(r":predictLongRunning$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": operation })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":fetchPredictOperation$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "predictions": [{
                "video": STANDARD.encode(bytes),
                "bytesBase64Encoded": STANDARD.encode(bytes)
            }]
        })))
        .mount(server)
        .await;
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns_and_stops() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let handler = test_handler(&config);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let api_handle = tokio::spawn(start_api_server(handler, Arc::new(config), async move {
        stop_rx.await.ok();
    }));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), api_handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let (app, _handler) = test_app(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.server.api.cors_enabled = false;
    let (app, _handler) = test_app(config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_api_key_guards_generation_but_not_health() {
    let server = MockServer::start().await;
    let mut config = test_config(&server);
    config.server.api.api_key = Some("secret".into());
    let (app, _handler) = test_app(config);

    let response = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "a lighthouse" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let server = MockServer::start().await;

    let mut config = test_config(&server);
    config.server.api.swagger_ui = true;
    let (app, _handler) = test_app(config);
    let response = app.oneshot(get_request("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = test_config(&server);
    config.server.api.swagger_ui = false;
    let (app, _handler) = test_app(config);
    let response = app.oneshot(get_request("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
