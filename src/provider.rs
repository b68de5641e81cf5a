//! Provider HTTP client
//!
//! [`ProviderClient`] is built once by the composition root and shared by
//! reference; nothing here holds a global client. On top of it sit the two
//! seams the polling loop depends on:
//!
//! - [`StatusSource`] - one fetch-status call, classified into a body,
//!   "not ready", or a fatal status
//! - [`ArtifactFetcher`] - downloads artifacts delivered by reference
//!
//! Both are traits so the poller and extractor can be driven by in-memory
//! stubs in tests.

use crate::clock::Clock;
use crate::config::{PollingConfig, ProviderConfig, RetryConfig};
use crate::credentials::BearerToken;
use crate::error::{Error, ExtractionError, PollError, Result};
use crate::retry::with_retry;
use crate::types::{GenerationKind, OperationHandle};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Provider method that starts a long-running prediction
pub const SUBMIT_METHOD: &str = "predictLongRunning";

/// Provider method that reports the state of a long-running prediction
pub const FETCH_METHOD: &str = "fetchPredictOperation";

/// Longest response body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client bound to one provider configuration
#[derive(Clone, Debug)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// Build a client with the configured request timeout
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be created
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("genjob/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Provider configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Model name used for `kind`
    pub fn model_for(&self, kind: GenerationKind) -> &str {
        match kind {
            GenerationKind::Video => &self.config.video_model,
            GenerationKind::Image => &self.config.image_model,
        }
    }

    /// Full URL of `method` on the model serving `kind`
    pub fn model_url(&self, kind: GenerationKind, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.location,
            self.model_for(kind),
            method
        )
    }

    /// POST a JSON body with the bearer token
    pub async fn post_json(
        &self,
        url: &str,
        token: &BearerToken,
        body: &Value,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(url)
            .bearer_auth(token.secret())
            .json(body)
            .send()
            .await
    }

    /// Turn an artifact reference into a fetchable HTTP(S) URL
    ///
    /// `gs://bucket/object` is rewritten onto the storage download base.
    pub fn resolve_reference(&self, reference: &str) -> std::result::Result<String, ExtractionError> {
        if let Some(rest) = reference.strip_prefix("gs://") {
            if rest.is_empty() || !rest.contains('/') {
                return Err(ExtractionError::UnsupportedUri(reference.to_string()));
            }
            return Ok(format!(
                "{}/{}",
                self.config.storage_download_base.trim_end_matches('/'),
                rest
            ));
        }

        match url::Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.into()),
            _ => Err(ExtractionError::UnsupportedUri(reference.to_string())),
        }
    }

    /// GET `url` with the bearer token and return the body
    ///
    /// Non-2xx statuses are returned as errors carrying the status.
    pub async fn download(
        &self,
        url: &str,
        token: &BearerToken,
    ) -> std::result::Result<Vec<u8>, reqwest::Error> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Truncate a response body for error messages
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// One fetch-status call against an operation
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current provider response for `handle`
    ///
    /// A 2xx body comes back as `Ok` even when it holds no artifact yet.
    async fn fetch_status(&self, handle: &OperationHandle) -> std::result::Result<Value, PollError>;
}

/// [`StatusSource`] backed by the provider's fetch-status endpoint
pub struct ProviderStatusSource {
    client: Arc<ProviderClient>,
    token: BearerToken,
    not_ready_statuses: Vec<u16>,
}

impl ProviderStatusSource {
    /// Create a status source that reuses `token` for every attempt
    pub fn new(client: Arc<ProviderClient>, token: BearerToken, polling: &PollingConfig) -> Self {
        Self {
            client,
            token,
            not_ready_statuses: polling.not_ready_statuses.clone(),
        }
    }
}

#[async_trait]
impl StatusSource for ProviderStatusSource {
    async fn fetch_status(&self, handle: &OperationHandle) -> std::result::Result<Value, PollError> {
        let url = self.client.model_url(handle.kind, FETCH_METHOD);
        let body = serde_json::json!({ "operationName": handle.name });

        let response = self.client.post_json(&url, &self.token, &body).await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if (200..300).contains(&status) {
            // Some gateways hand back the payload itself instead of JSON
            return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
        }

        if self.not_ready_statuses.contains(&status) {
            debug!(operation = %handle.name, status, "operation not ready");
            return Err(PollError::NotReady { status });
        }

        Err(PollError::Fatal {
            status,
            body: truncate_body(&text),
        })
    }
}

/// Fetches artifact bytes delivered by reference
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download the artifact at `reference` (HTTP(S) URL or `gs://` path)
    async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ExtractionError>;
}

/// [`ArtifactFetcher`] that downloads with the job's bearer token
pub struct ProviderArtifactFetcher {
    client: Arc<ProviderClient>,
    token: BearerToken,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl ProviderArtifactFetcher {
    /// Create a fetcher that reuses `token` and retries per `retry`,
    /// backing off on `clock`
    pub fn new(
        client: Arc<ProviderClient>,
        token: BearerToken,
        retry: RetryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            token,
            retry,
            clock,
        }
    }
}

#[async_trait]
impl ArtifactFetcher for ProviderArtifactFetcher {
    async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ExtractionError> {
        let url = self.client.resolve_reference(reference)?;
        debug!(url = %url, "downloading artifact");

        with_retry(&self.retry, self.clock.as_ref(), || {
            self.client.download(&url, &self.token)
        })
            .await
            .map_err(|e| ExtractionError::Download(format!("{}: {}", url, e)))
    }
}

/// [`ArtifactFetcher`] for responses that never reference remote artifacts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetch;

#[async_trait]
impl ArtifactFetcher for NoFetch {
    async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ExtractionError> {
        Err(ExtractionError::UnsupportedUri(reference.to_string()))
    }
}
