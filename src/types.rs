//! Core types for genjob

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::FailureReason;

/// Unique identifier for one orchestrated job
///
/// Keys the temporary artifact location and the progress tracker entry,
/// so concurrent jobs never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// What kind of media a job generates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// Video generation (the long-running case)
    #[default]
    Video,
    /// Still image generation
    Image,
}

impl GenerationKind {
    /// Lowercase name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Video => "video",
            GenerationKind::Image => "image",
        }
    }

    /// Content type assumed when nothing better is known
    pub fn default_content_type(&self) -> &'static str {
        match self {
            GenerationKind::Video => "video/mp4",
            GenerationKind::Image => "image/png",
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output aspect ratio
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AspectRatio {
    /// 16:9
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16
    #[serde(rename = "9:16")]
    Portrait,
    /// 1:1
    #[serde(rename = "1:1")]
    Square,
    /// 4:3
    #[serde(rename = "4:3")]
    Standard,
    /// 3:4
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    /// Ratio string as sent to the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
        }
    }

    /// Width and height of a placeholder thumbnail with this ratio
    pub fn thumbnail_dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (320, 180),
            AspectRatio::Portrait => (180, 320),
            AspectRatio::Square => (240, 240),
            AspectRatio::Standard => (320, 240),
            AspectRatio::StandardPortrait => (240, 320),
        }
    }
}

/// Output resolution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Resolution {
    /// 1280x720
    #[default]
    #[serde(rename = "720p")]
    Hd,
    /// 1920x1080
    #[serde(rename = "1080p")]
    FullHd,
}

impl Resolution {
    /// Resolution string as sent to the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hd => "720p",
            Resolution::FullHd => "1080p",
        }
    }
}

/// Provider-facing generation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Requested clip length in seconds (video only, default: 8)
    #[serde(default = "default_duration")]
    pub duration: u32,

    /// Aspect ratio (default: 16:9)
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Resolution (default: 720p)
    #[serde(default)]
    pub resolution: Resolution,

    /// Number of samples to generate (default: 1)
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,

    /// Things the generator should avoid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Fixed seed for reproducible output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            sample_count: default_sample_count(),
            negative_prompt: None,
            seed: None,
        }
    }
}

fn default_duration() -> u32 {
    8
}

fn default_sample_count() -> u32 {
    1
}

/// A request to generate one artifact
///
/// Immutable once handed to the submitter.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Prompt text (must be non-empty)
    pub prompt: String,
    /// Media kind
    #[serde(default)]
    pub kind: GenerationKind,
    /// Provider settings
    #[serde(default)]
    pub settings: GenerationSettings,
    /// When the request was created
    #[serde(default = "chrono::Utc::now")]
    pub requested_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// Create a request stamped with the current time
    pub fn new(prompt: impl Into<String>, kind: GenerationKind, settings: GenerationSettings) -> Self {
        Self {
            prompt: prompt.into(),
            kind,
            settings,
            requested_at: Utc::now(),
        }
    }

    /// Shorthand for a video request with default settings
    pub fn video(prompt: impl Into<String>) -> Self {
        Self::new(prompt, GenerationKind::Video, GenerationSettings::default())
    }

    /// Shorthand for an image request with default settings
    pub fn image(prompt: impl Into<String>) -> Self {
        Self::new(prompt, GenerationKind::Image, GenerationSettings::default())
    }
}

/// Provider-issued handle for an in-flight operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Opaque operation name
    pub name: String,
    /// When the submit call returned
    pub submitted_at: DateTime<Utc>,
    /// Media kind of the submitted job
    pub kind: GenerationKind,
}

impl OperationHandle {
    /// Create a handle stamped with the current time
    pub fn new(name: impl Into<String>, kind: GenerationKind) -> Self {
        Self {
            name: name.into(),
            submitted_at: Utc::now(),
            kind,
        }
    }
}

/// Outcome of one poll attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Not ready, nothing found, or a transient failure
    Pending,
    /// An artifact was extracted
    Succeeded,
    /// The provider answered with a terminal status
    FatalError,
}

/// Record of one poll attempt, alive only for the duration of the loop
#[derive(Clone, Debug)]
pub struct PollAttempt {
    /// 1-based attempt index
    pub index: u32,
    /// When the attempt was made
    pub at: DateTime<Utc>,
    /// HTTP status, when a response was received
    pub http_status: Option<u16>,
    /// Raw response body (2xx only)
    pub response: Option<serde_json::Value>,
    /// Classified outcome
    pub outcome: AttemptOutcome,
}

/// Which extraction strategy located an artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    /// Well-known top-level field
    DirectField,
    /// Priority list of fields on the first prediction
    PredictionField,
    /// Longest string field of a prediction that declares a media MIME type
    MimeDeclaredScan,
    /// The response body is itself the payload
    WholeResponseString,
    /// Longest base64 run in the serialized response
    GlobalBase64Scan,
    /// Depth-first walk for the first large unstructured string
    RecursiveWalk,
}

impl SourceStrategy {
    /// All strategies in chain order
    pub const ALL: [SourceStrategy; 6] = [
        SourceStrategy::DirectField,
        SourceStrategy::PredictionField,
        SourceStrategy::MimeDeclaredScan,
        SourceStrategy::WholeResponseString,
        SourceStrategy::GlobalBase64Scan,
        SourceStrategy::RecursiveWalk,
    ];

    /// snake_case name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStrategy::DirectField => "direct_field",
            SourceStrategy::PredictionField => "prediction_field",
            SourceStrategy::MimeDeclaredScan => "mime_declared_scan",
            SourceStrategy::WholeResponseString => "whole_response_string",
            SourceStrategy::GlobalBase64Scan => "global_base64_scan",
            SourceStrategy::RecursiveWalk => "recursive_walk",
        }
    }
}

impl std::fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact bytes accepted from a poll response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedArtifact {
    /// Decoded or downloaded payload
    pub bytes: Vec<u8>,
    /// Strategy that produced the winning candidate
    pub source: SourceStrategy,
    /// Length of `bytes`
    pub size_bytes: usize,
    /// MIME type declared by the provider, if any
    pub mime_type: Option<String>,
    /// Provider-supplied thumbnail reference, if any
    pub thumbnail: Option<String>,
    /// URL the bytes were downloaded from, when delivered by reference
    pub origin_url: Option<String>,
}

impl ExtractedArtifact {
    /// Accept `bytes` only if they exceed `min_plausible_size`
    pub fn accept(bytes: Vec<u8>, source: SourceStrategy, min_plausible_size: usize) -> Option<Self> {
        if bytes.len() <= min_plausible_size {
            return None;
        }
        Some(Self {
            size_bytes: bytes.len(),
            bytes,
            source,
            mime_type: None,
            thumbnail: None,
            origin_url: None,
        })
    }
}

/// Terminal status of a descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Artifact available
    Completed,
    /// No artifact; see `failure`
    Failed,
}

/// Why a descriptor failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FailureInfo {
    /// Reason code
    pub reason: FailureReason,
    /// Human-readable detail
    pub message: String,
}

/// The single entity returned across the orchestrator boundary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Job that produced this descriptor
    pub job_id: JobId,
    /// Provider operation name (absent only if submission never happened)
    pub operation_id: Option<String>,
    /// completed | failed
    pub status: ArtifactStatus,
    /// MIME type of the artifact
    pub content_type: Option<String>,
    /// Inline `data:` URI, or a `file://` URI when persisted
    pub artifact_uri: Option<String>,
    /// Filesystem path when the artifact was persisted instead of inlined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,
    /// Thumbnail URI (provider-supplied or synthesized placeholder)
    pub thumbnail_uri: Option<String>,
    /// Clip length in seconds (video only)
    pub duration_seconds: Option<u32>,
    /// Artifact size in bytes
    pub size_bytes: Option<usize>,
    /// Strategy that located the artifact
    pub source_strategy: Option<SourceStrategy>,
    /// Number of fetch-status calls made
    pub attempts: u32,
    /// Failure detail when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl ArtifactDescriptor {
    /// Whether the descriptor carries an artifact
    pub fn is_completed(&self) -> bool {
        self.status == ArtifactStatus::Completed
    }
}

/// Coarse progress phase of a job, for the status endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "phase", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum JobPhase {
    /// Submit call in flight
    Submitting,
    /// Initial delay before the first status check
    Waiting {
        /// Initial delay in seconds
        delay_secs: u64,
    },
    /// Status checks in progress
    Polling {
        /// Attempts made so far
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
    },
    /// Artifact found, building the descriptor
    Materializing,
    /// Finished with an artifact
    Completed,
    /// Finished without an artifact
    Failed {
        /// Reason code
        reason: FailureReason,
    },
    /// Submission was rejected; no descriptor was produced
    Rejected,
}

impl JobPhase {
    /// Whether the job has reached a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Failed { .. } | JobPhase::Rejected
        )
    }
}

/// Snapshot of a job's progress
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Job identifier
    pub job_id: JobId,
    /// Media kind
    pub kind: GenerationKind,
    /// Provider operation name once submitted
    pub operation_id: Option<String>,
    /// Current phase
    #[serde(flatten)]
    pub phase: JobPhase,
    /// When the job started
    pub started_at: DateTime<Utc>,
    /// Last phase change
    pub updated_at: DateTime<Utc>,
}

/// Progress events broadcast to subscribers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was accepted and is about to be submitted
    JobAccepted {
        /// Job identifier
        job_id: JobId,
        /// Media kind
        kind: GenerationKind,
    },
    /// The provider accepted the submission
    JobSubmitted {
        /// Job identifier
        job_id: JobId,
        /// Provider operation name
        operation_id: String,
    },
    /// A fetch-status call completed
    PollAttempted {
        /// Job identifier
        job_id: JobId,
        /// 1-based attempt index
        attempt: u32,
        /// Classified outcome
        outcome: AttemptOutcome,
    },
    /// An artifact was materialized
    JobCompleted {
        /// Job identifier
        job_id: JobId,
        /// Winning strategy
        strategy: SourceStrategy,
        /// Artifact size in bytes
        size_bytes: usize,
    },
    /// The job ended without an artifact
    JobFailed {
        /// Job identifier
        job_id: JobId,
        /// Reason code
        reason: FailureReason,
    },
    /// Submission was rejected
    JobRejected {
        /// Job identifier
        job_id: JobId,
        /// Error message
        error: String,
    },
}
