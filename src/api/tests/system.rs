use super::*;

#[tokio::test]
async fn test_health_endpoint() {
    let server = MockServer::start().await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["accepting"], true);
}

#[tokio::test]
async fn test_health_reports_shutdown() {
    let server = MockServer::start().await;
    let (app, handler) = test_app(test_config(&server));
    handler.shutdown().await.unwrap();

    let body = json_body(app.oneshot(get_request("/health")).await.unwrap()).await;

    assert_eq!(body["accepting"], false);
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let server = MockServer::start().await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app.oneshot(get_request("/openapi.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let spec = json_body(response).await;
    assert!(spec["openapi"].as_str().unwrap().starts_with("3."));
    assert!(spec["paths"]["/generate"].is_object());
}

#[tokio::test]
async fn test_event_stream_content_type() {
    let server = MockServer::start().await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app.oneshot(get_request("/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
}

#[test]
fn test_event_names_match_serialized_tags() {
    use crate::types::{Event, GenerationKind, JobId};

    let event = Event::JobAccepted {
        job_id: JobId::new(),
        kind: GenerationKind::Video,
    };
    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["type"], routes::event_name(&event));
}
