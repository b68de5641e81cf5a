//! Error types for genjob
//!
//! This module defines the orchestrator's error taxonomy:
//! - [`SubmissionError`] - the only failure that reaches callers as a hard error
//! - [`PollError`] - per-attempt fetch-status failures (transient or fatal)
//! - [`ExtractionError`] - candidate validation failures, always swallowed
//! - [`MaterializationError`] - temp I/O failures, converted into failed descriptors
//! - [`FailureReason`] - the reason codes carried by failed descriptors
//!
//! It also provides the HTTP status mapping and JSON error body used by the API.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for genjob operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for genjob
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.max_attempts")
        key: Option<String>,
    },

    /// Job submission failed (bad request, credentials, network, provider rejection)
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),

    /// Credential provider could not issue a bearer token
    #[error("credential error: {0}")]
    Credential(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Job or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while submitting a generation job
///
/// These are surfaced synchronously to the caller and never retried internally.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The request failed validation before anything was sent
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    /// No bearer credential could be obtained
    #[error("failed to obtain provider credential: {0}")]
    Credential(String),

    /// The submit call never produced an HTTP response
    #[error("submit request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// The provider answered with a non-2xx status
    #[error("provider rejected submission with status {status}: {body}")]
    Rejected {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The provider answered 2xx but without an operation identifier
    #[error("provider response did not contain an operation identifier")]
    MissingOperationId,
}

/// Errors from a single fetch-status call
#[derive(Debug, Error)]
pub enum PollError {
    /// The provider reports the operation is not ready yet; keep polling
    #[error("operation not ready (status {status})")]
    NotReady {
        /// HTTP status classified as "not ready"
        status: u16,
    },

    /// The provider answered with a status that terminates the job
    #[error("fetch-status failed with status {status}: {body}")]
    Fatal {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The request never produced an HTTP response
    #[error("fetch-status request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors raised while validating an extraction candidate
///
/// These never escape a poll attempt; they are logged and the chain moves on.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Candidate could not be decoded as base64
    #[error("candidate is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Candidate decoded but is too small to be a real artifact
    #[error("artifact too small: {size} bytes (need more than {min})")]
    TooSmall {
        /// Decoded size in bytes
        size: usize,
        /// Minimum plausible size
        min: usize,
    },

    /// Candidate referenced a URL that could not be downloaded
    #[error("artifact download failed: {0}")]
    Download(String),

    /// Candidate referenced a scheme the orchestrator cannot fetch
    #[error("unsupported artifact reference: {0}")]
    UnsupportedUri(String),
}

/// Errors raised while turning artifact bytes into a descriptor
#[derive(Debug, Error)]
pub enum MaterializationError {
    /// Temporary file could not be created, written or read back
    #[error("temporary artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Temporary file could not be moved into the persist directory
    #[error("failed to persist artifact to {path}: {reason}")]
    Persist {
        /// Destination path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Bytes read back from the temporary file differ in length from what was written
    #[error("artifact size mismatch after write: expected {expected} bytes, found {found}")]
    SizeMismatch {
        /// Bytes written
        expected: usize,
        /// Bytes read back
        found: usize,
    },
}

/// Reason code attached to a failed descriptor
///
/// Serialized with the variant name so the UI sees e.g. `"TimeoutExceeded"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FailureReason {
    /// All polling attempts were used without finding an artifact
    TimeoutExceeded,
    /// The wall-clock budget or a caller deadline ran out before attempts did
    DeadlineExceeded,
    /// The provider answered a poll with a terminal status
    PollFatalError,
    /// The job was cancelled (caller disconnect or shutdown)
    Cancelled,
    /// Artifact bytes were found but could not be materialized
    MaterializationError,
}

impl FailureReason {
    /// Machine-readable snake_case code, used in logs and events
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::TimeoutExceeded => "timeout_exceeded",
            FailureReason::DeadlineExceeded => "deadline_exceeded",
            FailureReason::PollFatalError => "poll_fatal",
            FailureReason::Cancelled => "cancelled",
            FailureReason::MaterializationError => "materialization_failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "provider_rejected",
///     "message": "submission failed: provider rejected submission with status 401: ...",
///     "details": { "provider_status": 401 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_request", "provider_rejected")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Submission(e) => match e {
                SubmissionError::InvalidRequest(_) => 400,
                // Provider refused the prompt or parameters
                SubmissionError::Rejected {
                    status: 400 | 422, ..
                } => 422,
                SubmissionError::Rejected { status: 429, .. } => 429,
                SubmissionError::Rejected { .. } => 502,
                SubmissionError::Network(_) => 502,
                SubmissionError::MissingOperationId => 502,
                SubmissionError::Credential(_) => 500,
            },

            Error::NotFound(_) => 404,

            Error::Network(_) => 502,

            Error::ShuttingDown => 503,

            Error::Config { .. }
            | Error::Credential(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Submission(e) => match e {
                SubmissionError::InvalidRequest(_) => "invalid_request",
                SubmissionError::Credential(_) => "credential_error",
                SubmissionError::Network(_) => "provider_unreachable",
                SubmissionError::Rejected { .. } => "provider_rejected",
                SubmissionError::MissingOperationId => "missing_operation_id",
            },
            Error::Credential(_) => "credential_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Submission(SubmissionError::Rejected { status, .. }) => {
                Some(serde_json::json!({ "provider_status": status }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
