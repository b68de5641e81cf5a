//! Configuration types for genjob

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for the orchestrator
///
/// Every field has a default, so an empty JSON object is a valid config
/// apart from the credential source, which [`Config::validate`] insists on.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Provider endpoints and models
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Polling cadence and budgets
    #[serde(default)]
    pub polling: PollingConfig,

    /// Extraction thresholds and field profiles
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Temporary and persistent artifact storage
    #[serde(default)]
    pub materialize: MaterializeConfig,

    /// Where bearer credentials come from
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Retry policy for artifact downloads
    #[serde(default)]
    pub download_retry: RetryConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load a config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `GENJOB_*` environment overrides on top of this config
    ///
    /// Recognized variables: `GENJOB_PROVIDER_BASE_URL`, `GENJOB_PROJECT_ID`,
    /// `GENJOB_LOCATION`, `GENJOB_VIDEO_MODEL`, `GENJOB_IMAGE_MODEL`,
    /// `GENJOB_ACCESS_TOKEN`, `GENJOB_BIND_ADDRESS`, `GENJOB_API_KEY`,
    /// `GENJOB_INITIAL_DELAY_SECS`, `GENJOB_POLL_INTERVAL_SECS`,
    /// `GENJOB_MAX_ATTEMPTS`, `GENJOB_MAX_JOB_DURATION_SECS`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_var("GENJOB_PROVIDER_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = env_var("GENJOB_PROJECT_ID") {
            self.provider.project_id = v;
        }
        if let Some(v) = env_var("GENJOB_LOCATION") {
            self.provider.location = v;
        }
        if let Some(v) = env_var("GENJOB_VIDEO_MODEL") {
            self.provider.video_model = v;
        }
        if let Some(v) = env_var("GENJOB_IMAGE_MODEL") {
            self.provider.image_model = v;
        }
        if let Some(v) = env_var("GENJOB_ACCESS_TOKEN") {
            self.credentials.static_token = Some(v);
        }
        if let Some(v) = env_var("GENJOB_API_KEY") {
            self.server.api.api_key = Some(v);
        }
        if let Some(v) = env_var("GENJOB_BIND_ADDRESS") {
            self.server.api.bind_address = v
                .parse()
                .map_err(|e| Error::config("server.api.bind_address", format!("{v}: {e}")))?;
        }
        if let Some(secs) = env_secs("GENJOB_INITIAL_DELAY_SECS", "polling.initial_delay")? {
            self.polling.initial_delay = secs;
        }
        if let Some(secs) = env_secs("GENJOB_POLL_INTERVAL_SECS", "polling.interval")? {
            self.polling.interval = secs;
        }
        if let Some(secs) = env_secs("GENJOB_MAX_JOB_DURATION_SECS", "polling.max_job_duration")? {
            self.polling.max_job_duration = Some(secs);
        }
        if let Some(v) = env_var("GENJOB_MAX_ATTEMPTS") {
            self.polling.max_attempts = v
                .parse()
                .map_err(|e| Error::config("polling.max_attempts", format!("{v}: {e}")))?;
        }
        Ok(())
    }

    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(Error::config("provider.base_url", "must not be empty"));
        }
        if url::Url::parse(&self.provider.base_url).is_err() {
            return Err(Error::config(
                "provider.base_url",
                format!("not a valid URL: {}", self.provider.base_url),
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(Error::config("polling.max_attempts", "must be at least 1"));
        }
        if self.extraction.min_plausible_size == 0 {
            return Err(Error::config(
                "extraction.min_plausible_size",
                "must be greater than zero",
            ));
        }
        if self.extraction.min_base64_run < 4 {
            return Err(Error::config(
                "extraction.min_base64_run",
                "must be at least 4 characters",
            ));
        }
        if self.credentials.static_token.is_none() && self.credentials.token_command.is_none() {
            return Err(Error::config(
                "credentials",
                "either static_token or token_command must be set",
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(name: &str, key: &str) -> Result<Option<Duration>> {
    match env_var(name) {
        Some(v) => v
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| Error::config(key, format!("{name}={v}: {e}"))),
        None => Ok(None),
    }
}

/// Provider endpoint configuration
///
/// Operation URLs are built as
/// `{base_url}/v1/projects/{project_id}/locations/{location}/publishers/google/models/{model}:{method}`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfig {
    /// API base URL (default: "https://us-central1-aiplatform.googleapis.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cloud project identifier
    #[serde(default)]
    pub project_id: String,

    /// Region (default: "us-central1")
    #[serde(default = "default_location")]
    pub location: String,

    /// Video model name
    #[serde(default = "default_video_model")]
    pub video_model: String,

    /// Image model name
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Per-request HTTP timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Base URL used to fetch `gs://bucket/object` references
    #[serde(default = "default_storage_download_base")]
    pub storage_download_base: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: String::new(),
            location: default_location(),
            video_model: default_video_model(),
            image_model: default_image_model(),
            request_timeout: default_request_timeout(),
            storage_download_base: default_storage_download_base(),
        }
    }
}

/// Polling cadence and budgets
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PollingConfig {
    /// Wait before the first status check (default: 120 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Wait between status checks (default: 10 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Maximum number of status checks (default: 30)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// HTTP statuses that mean "not ready yet, keep polling"
    ///
    /// Every other non-2xx status terminates the job.
    #[serde(default = "default_not_ready_statuses")]
    pub not_ready_statuses: Vec<u16>,

    /// Hard cap on a single job's wall-clock time, for hosts that limit
    /// request duration. Applied as a deadline on top of the attempt budget.
    #[serde(default, with = "optional_duration_serde")]
    pub max_job_duration: Option<Duration>,
}

impl PollingConfig {
    /// `initial_delay + max_attempts × interval`
    pub fn budget(&self) -> Duration {
        self.initial_delay + self.interval * self.max_attempts
    }

    /// Whether `status` is classified as "not ready"
    pub fn is_not_ready(&self, status: u16) -> bool {
        self.not_ready_statuses.contains(&status)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
            not_ready_statuses: default_not_ready_statuses(),
            max_job_duration: None,
        }
    }
}

/// Extraction thresholds and field profiles
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractionConfig {
    /// Decoded artifacts must be strictly larger than this (default: 1000 bytes)
    #[serde(default = "default_min_plausible_size")]
    pub min_plausible_size: usize,

    /// Minimum string length considered by the MIME scan, whole-response
    /// and recursive-walk strategies (default: 100)
    #[serde(default = "default_min_candidate_len")]
    pub min_candidate_len: usize,

    /// Minimum base64 run length for the global scan (default: 1000)
    #[serde(default = "default_min_base64_run")]
    pub min_base64_run: usize,

    /// Field profile for video jobs
    #[serde(default = "FieldProfile::video")]
    pub video: FieldProfile,

    /// Field profile for image jobs
    #[serde(default = "FieldProfile::image")]
    pub image: FieldProfile,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_plausible_size: default_min_plausible_size(),
            min_candidate_len: default_min_candidate_len(),
            min_base64_run: default_min_base64_run(),
            video: FieldProfile::video(),
            image: FieldProfile::image(),
        }
    }
}

/// Field names searched by the direct and prediction strategies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldProfile {
    /// Top-level fields that may hold the payload directly
    pub direct_fields: Vec<String>,

    /// Prediction sub-fields in priority order; dotted names address nested objects
    pub prediction_fields: Vec<String>,

    /// Fields that may hold a provider thumbnail
    #[serde(default = "default_thumbnail_fields")]
    pub thumbnail_fields: Vec<String>,
}

impl FieldProfile {
    /// Video profile: `video` at top level, then the prediction priority list
    pub fn video() -> Self {
        Self {
            direct_fields: vec!["video".into()],
            prediction_fields: vec![
                "video".into(),
                "videoData".into(),
                "content.video".into(),
                "bytes".into(),
                "data".into(),
            ],
            thumbnail_fields: default_thumbnail_fields(),
        }
    }

    /// Image profile
    pub fn image() -> Self {
        Self {
            direct_fields: vec!["image".into()],
            prediction_fields: vec![
                "bytesBase64Encoded".into(),
                "image".into(),
                "bytes".into(),
                "data".into(),
            ],
            thumbnail_fields: default_thumbnail_fields(),
        }
    }
}

/// Temporary and persistent artifact storage
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct MaterializeConfig {
    /// Directory for scoped temporary files (default: system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// When set, artifacts are moved here and descriptors carry a file URI
    /// instead of an inline data URI
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
}

/// Where bearer credentials come from
///
/// A fresh credential is requested for every job; nothing is cached.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CredentialConfig {
    /// Fixed token (development, tests)
    #[serde(default)]
    pub static_token: Option<String>,

    /// Command whose stdout is a fresh access token
    /// (e.g. `gcloud auth print-access-token`)
    #[serde(default)]
    pub token_command: Option<TokenCommandConfig>,
}

/// External token command
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenCommandConfig {
    /// Program to execute
    pub program: PathBuf,

    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for the command (default: 30 seconds)
    #[serde(default = "default_token_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_retry_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_retry_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay: default_retry_initial_delay(),
            max_delay: default_retry_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8787)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: false)
    #[serde(default)]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: false,
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://us-central1-aiplatform.googleapis.com".to_string()
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_video_model() -> String {
    "veo-2.0-generate-001".to_string()
}

fn default_image_model() -> String {
    "imagen-3.0-generate-002".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_storage_download_base() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    30
}

fn default_not_ready_statuses() -> Vec<u16> {
    vec![404, 408, 409, 425, 429]
}

fn default_min_plausible_size() -> usize {
    1000
}

fn default_min_candidate_len() -> usize {
    100
}

fn default_min_base64_run() -> usize {
    1000
}

fn default_thumbnail_fields() -> Vec<String> {
    vec!["thumbnail".into(), "thumbnailUri".into()]
}

fn default_token_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.credentials.static_token = Some("token".into());
        config
    }

    #[test]
    fn test_defaults_match_provider_tuning() {
        let config = Config::default();

        assert_eq!(config.polling.initial_delay, Duration::from_secs(120));
        assert_eq!(config.polling.interval, Duration::from_secs(10));
        assert_eq!(config.polling.max_attempts, 30);
        assert_eq!(config.polling.budget(), Duration::from_secs(420));
        assert_eq!(config.extraction.min_plausible_size, 1000);
        assert_eq!(
            config.extraction.video.prediction_fields,
            vec!["video", "videoData", "content.video", "bytes", "data"]
        );
    }

    #[test]
    fn test_not_ready_classification() {
        let polling = PollingConfig::default();

        assert!(polling.is_not_ready(404));
        assert!(polling.is_not_ready(429));
        assert!(!polling.is_not_ready(401));
        assert!(!polling.is_not_ready(400));
        assert!(!polling.is_not_ready(500));
    }

    #[test]
    fn test_empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.polling.max_attempts, 30);
        assert_eq!(config.server.api.bind_address.port(), 8787);
        assert!(config.materialize.persist_dir.is_none());
    }

    #[test]
    fn test_durations_deserialize_from_seconds() {
        let config: Config = serde_json::from_str(
            r#"{"polling": {"initial_delay": 5, "interval": 1, "max_attempts": 3, "max_job_duration": 60}}"#,
        )
        .unwrap();

        assert_eq!(config.polling.initial_delay, Duration::from_secs(5));
        assert_eq!(config.polling.interval, Duration::from_secs(1));
        assert_eq!(config.polling.max_job_duration, Some(Duration::from_secs(60)));
        assert_eq!(config.polling.budget(), Duration::from_secs(8));
    }

    #[test]
    fn test_validate_requires_credential_source() {
        let err = Config::default().validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("credentials")),
            other => panic!("expected config error, got {other:?}"),
        }

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts_and_bad_url() {
        let mut config = valid_config();
        config.polling.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.provider.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genjob.json");
        std::fs::write(
            &path,
            r#"{"provider": {"project_id": "demo"}, "credentials": {"static_token": "t"}}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.provider.project_id, "demo");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var("GENJOB_MAX_ATTEMPTS", "5");
            std::env::set_var("GENJOB_POLL_INTERVAL_SECS", "2");
            std::env::set_var("GENJOB_ACCESS_TOKEN", "from-env");
        }

        let mut config = Config::default();
        let result = config.apply_env_overrides();

        unsafe {
            std::env::remove_var("GENJOB_MAX_ATTEMPTS");
            std::env::remove_var("GENJOB_POLL_INTERVAL_SECS");
            std::env::remove_var("GENJOB_ACCESS_TOKEN");
        }

        result.unwrap();
        assert_eq!(config.polling.max_attempts, 5);
        assert_eq!(config.polling.interval, Duration::from_secs(2));
        assert_eq!(config.credentials.static_token.as_deref(), Some("from-env"));
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        unsafe {
            std::env::set_var("GENJOB_MAX_ATTEMPTS", "many");
        }

        let mut config = Config::default();
        let result = config.apply_env_overrides();

        unsafe {
            std::env::remove_var("GENJOB_MAX_ATTEMPTS");
        }

        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
