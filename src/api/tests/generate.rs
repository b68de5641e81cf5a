use super::*;

fn artifact_bytes() -> Vec<u8> {
    (0..3000).map(|i| (i % 199) as u8).collect()
}

#[tokio::test]
async fn test_generate_video_returns_completed_descriptor() {
    let server = MockServer::start().await;
    let bytes = artifact_bytes();
    mount_finished_operation(&server, "op-123", &bytes).await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json(
            "/generate/video",
            json!({
                "prompt": "a lighthouse at dusk",
                "settings": { "duration": 6, "aspectRatio": "9:16", "resolution": "1080p" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["operationId"], "op-123");
    assert_eq!(body["durationSeconds"], 6);
    assert_eq!(body["contentType"], "video/mp4");
    assert_eq!(
        body["artifactUri"],
        format!("data:video/mp4;base64,{}", STANDARD.encode(&bytes))
    );
    assert!(
        body["thumbnailUri"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml")
    );
}

#[tokio::test]
async fn test_generate_image_has_no_duration() {
    let server = MockServer::start().await;
    mount_finished_operation(&server, "op-img", &artifact_bytes()).await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json("/generate/image", json!({ "prompt": "a red bicycle" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["contentType"], "image/png");
    assert!(body["durationSeconds"].is_null());
}

#[tokio::test]
async fn test_generate_uses_kind_from_body() {
    let server = MockServer::start().await;
    mount_finished_operation(&server, "op-img", &artifact_bytes()).await;
    let (app, handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json(
            "/generate",
            json!({ "prompt": "a red bicycle", "kind": "image" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let jobs = handler.list_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, crate::types::GenerationKind::Image);
}

#[tokio::test]
async fn test_rejected_submission_is_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":predictLongRunning$"))
        .respond_with(ResponseTemplate::new(401).set_body_string("request had invalid credentials"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":fetchPredictOperation$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "a lighthouse" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "provider_rejected");
    assert_eq!(body["error"]["details"]["provider_status"], 401);
}

#[tokio::test]
async fn test_invalid_prompt_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_malformed_body_is_a_client_error() {
    let server = MockServer::start().await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json("/generate", json!({ "settings": {} })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_poll_failure_is_a_failed_descriptor_not_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":predictLongRunning$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "op-500" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":fetchPredictOperation$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "a lighthouse" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["operationId"], "op-500");
    assert_eq!(body["failure"]["reason"], "PollFatalError");
    assert!(body["artifactUri"].is_null());
}

#[tokio::test]
async fn test_deadline_query_shortens_the_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":predictLongRunning$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "op-slow" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":fetchPredictOperation$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    let (app, _handler) = test_app(test_config(&server));

    let response = app
        .oneshot(post_json(
            "/generate?deadline_secs=60",
            json!({ "prompt": "a lighthouse" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["failure"]["reason"], "DeadlineExceeded");
    assert_eq!(body["attempts"], 0);
}

#[tokio::test]
async fn test_generate_after_shutdown_is_unavailable() {
    let server = MockServer::start().await;
    let (app, handler) = test_app(test_config(&server));
    handler.shutdown().await.unwrap();

    let response = app
        .oneshot(post_json("/generate", json!({ "prompt": "a lighthouse" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "shutting_down");
}

#[tokio::test]
async fn test_dropped_request_cancels_the_job() {
    use crate::error::FailureReason;
    use crate::types::JobPhase;
    use std::time::Duration;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r":predictLongRunning$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "op-gone" })))
        .mount(&server)
        .await;
    // First status check hangs long enough for the caller to give up
    Mock::given(method("POST"))
        .and(path_regex(r":fetchPredictOperation$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(5)),
        )
        .expect(..=1)
        .mount(&server)
        .await;
    let (app, handler) = test_app(test_config(&server));

    let request = app.oneshot(post_json(
        "/generate/video",
        json!({ "prompt": "a lighthouse at dusk" }),
    ));
    let gave_up = tokio::time::timeout(Duration::from_millis(500), request).await;
    assert!(gave_up.is_err(), "request should still be running");

    let mut phase = None;
    for _ in 0..100 {
        let jobs = handler.list_jobs().await;
        if let Some(job) = jobs.first()
            && job.phase.is_terminal()
        {
            phase = Some(job.phase.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(matches!(
        phase,
        Some(JobPhase::Failed {
            reason: FailureReason::Cancelled
        })
    ));
    assert_eq!(handler.list_jobs().await.len(), 1);
}
