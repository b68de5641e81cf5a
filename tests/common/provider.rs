//! Mock provider and handler wiring

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use genjob::clock::ManualClock;
use genjob::credentials::StaticCredential;
use genjob::{Config, JobHandler};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Project id used by every test config
pub const PROJECT: &str = "demo";

/// Token the static credential issues
pub const TOKEN: &str = "test-token";

const VIDEO_MODEL_PATH: &str =
    "/v1/projects/demo/locations/us-central1/publishers/google/models/veo-2.0-generate-001";

pub fn submit_path() -> String {
    format!("{VIDEO_MODEL_PATH}:predictLongRunning")
}

pub fn fetch_path() -> String {
    format!("{VIDEO_MODEL_PATH}:fetchPredictOperation")
}

/// Default polling cadence pointed at the mock provider
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.provider.base_url = server.uri();
    config.provider.project_id = PROJECT.into();
    config.provider.storage_download_base = format!("{}/storage", server.uri());
    config.credentials.static_token = Some(TOKEN.into());
    config
}

/// Handler on virtual time; returns the clock so tests can check elapsed time
pub fn test_handler(config: Config) -> (JobHandler, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let handler =
        JobHandler::with_parts(config, Arc::new(StaticCredential::new(TOKEN)), clock.clone())
            .expect("handler should build");
    (handler, clock)
}

/// Deterministic, non-repeating payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 37 % 253) as u8).collect()
}

pub fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Submission answers with `operation`
pub async fn mount_submit_ok(server: &MockServer, operation: &str) {
    Mock::given(method("POST"))
        .and(path(submit_path()))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": operation })))
        .expect(1)
        .mount(server)
        .await;
}

/// The first `times` status checks for `operation` answer `body`
pub async fn mount_fetch_times(server: &MockServer, operation: &str, body: Value, times: u64) {
    Mock::given(method("POST"))
        .and(path(fetch_path()))
        .and(body_json(json!({ "operationName": operation })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .with_priority(1)
        .expect(times)
        .mount(server)
        .await;
}

/// Every status check for `operation` answers `body`
pub async fn mount_fetch_always(server: &MockServer, operation: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path(fetch_path()))
        .and(body_json(json!({ "operationName": operation })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
