//! Job submission
//!
//! [`JobSubmitter`] validates a [`GenerationRequest`], asks the credential
//! provider for a fresh token, and starts the provider's long-running
//! operation. Every failure here is a [`SubmissionError`] returned straight
//! to the caller; nothing is retried.

use crate::credentials::{BearerToken, CredentialProvider};
use crate::error::SubmissionError;
use crate::provider::{ProviderClient, SUBMIT_METHOD, truncate_body};
use crate::types::{GenerationKind, GenerationRequest, OperationHandle};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

/// Longest accepted prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Shortest accepted video duration, in seconds
pub const MIN_DURATION_SECS: u32 = 1;

/// Longest accepted video duration, in seconds
pub const MAX_DURATION_SECS: u32 = 60;

/// Largest accepted sample count
pub const MAX_SAMPLE_COUNT: u32 = 4;

/// A submitted job: the operation handle plus the token to poll it with
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    /// Provider-issued handle
    pub handle: OperationHandle,
    /// Credential issued for this job, reused for polls and downloads
    pub credential: BearerToken,
}

/// Starts generation operations on the provider
pub struct JobSubmitter {
    client: Arc<ProviderClient>,
    credentials: Arc<dyn CredentialProvider>,
}

impl JobSubmitter {
    /// Create a submitter
    pub fn new(client: Arc<ProviderClient>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Validate, authenticate and submit `request`
    ///
    /// # Errors
    /// - [`SubmissionError::InvalidRequest`] before anything is sent
    /// - [`SubmissionError::Credential`] if no token could be issued
    /// - [`SubmissionError::Network`] if the submit call got no response
    /// - [`SubmissionError::Rejected`] on any non-2xx status
    /// - [`SubmissionError::MissingOperationId`] if the 2xx body has no operation name
    pub async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> Result<SubmittedJob, SubmissionError> {
        validate_request(request)?;

        let credential = self
            .credentials
            .issue()
            .await
            .map_err(|e| {
                error!(credential = self.credentials.name(), error = %e, "could not issue token");
                SubmissionError::Credential(e.to_string())
            })?;

        let url = self.client.model_url(request.kind, SUBMIT_METHOD);
        let body = build_submit_body(request);

        let response = self
            .client
            .post_json(&url, &credential, &body)
            .await
            .map_err(|e| {
                error!(error = %e, kind = %request.kind, "submit request failed");
                SubmissionError::Network(e)
            })?;

        let status = response.status();
        let text = response.text().await.map_err(SubmissionError::Network)?;

        if !status.is_success() {
            error!(status = status.as_u16(), kind = %request.kind, "provider rejected submission");
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let name = serde_json::from_str::<Value>(&text)
            .ok()
            .as_ref()
            .and_then(operation_name)
            .ok_or(SubmissionError::MissingOperationId)?;

        info!(operation = %name, kind = %request.kind, "generation submitted");

        Ok(SubmittedJob {
            handle: OperationHandle::new(name, request.kind),
            credential,
        })
    }
}

/// Read the operation identifier from a submit response
///
/// Long-running operation responses carry `name`; some gateways use
/// `operationName` instead.
fn operation_name(body: &Value) -> Option<String> {
    ["operationName", "name"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

/// Check a request against provider limits
pub fn validate_request(request: &GenerationRequest) -> Result<(), SubmissionError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(SubmissionError::InvalidRequest(
            "prompt must not be empty".into(),
        ));
    }

    let prompt_chars = prompt.chars().count();
    if prompt_chars > MAX_PROMPT_CHARS {
        return Err(SubmissionError::InvalidRequest(format!(
            "prompt is {} characters, limit is {}",
            prompt_chars, MAX_PROMPT_CHARS
        )));
    }

    let settings = &request.settings;
    if request.kind == GenerationKind::Video
        && !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&settings.duration)
    {
        return Err(SubmissionError::InvalidRequest(format!(
            "duration must be between {} and {} seconds, got {}",
            MIN_DURATION_SECS, MAX_DURATION_SECS, settings.duration
        )));
    }

    if !(1..=MAX_SAMPLE_COUNT).contains(&settings.sample_count) {
        return Err(SubmissionError::InvalidRequest(format!(
            "sample count must be between 1 and {}, got {}",
            MAX_SAMPLE_COUNT, settings.sample_count
        )));
    }

    Ok(())
}

/// Provider request body for `request`
pub fn build_submit_body(request: &GenerationRequest) -> Value {
    let settings = &request.settings;
    let mut parameters = json!({
        "aspectRatio": settings.aspect_ratio.as_str(),
        "sampleCount": settings.sample_count,
    });

    if request.kind == GenerationKind::Video {
        parameters["durationSeconds"] = json!(settings.duration);
        parameters["resolution"] = json!(settings.resolution.as_str());
    }
    if let Some(negative) = settings.negative_prompt.as_deref().map(str::trim)
        && !negative.is_empty()
    {
        parameters["negativePrompt"] = json!(negative);
    }
    if let Some(seed) = settings.seed {
        parameters["seed"] = json!(seed);
    }

    json!({
        "instances": [{ "prompt": request.prompt.trim() }],
        "parameters": parameters,
    })
}
