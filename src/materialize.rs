//! Turning artifact bytes (or their absence) into descriptors
//!
//! Successful artifacts pass through a scoped temporary file named after the
//! job id. The file is deleted on every exit path unless a persist directory
//! is configured, in which case it is moved there and the descriptor points
//! at it. Nothing in this module returns an error to the caller: I/O
//! problems become a `failed` descriptor with reason `MaterializationError`.

use crate::config::MaterializeConfig;
use crate::error::{FailureReason, MaterializationError};
use crate::poller::{PollOutcome, TimeoutCause};
use crate::types::{
    AspectRatio, ArtifactDescriptor, ArtifactStatus, ExtractedArtifact, FailureInfo,
    GenerationKind, GenerationRequest, JobId,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info};

/// Where the materialized bytes ended up
enum Stored {
    /// Temporary file removed; bytes are inlined
    Inline(Vec<u8>),
    /// Moved into the persist directory
    Persisted(PathBuf),
}

/// Builds [`ArtifactDescriptor`]s
#[derive(Clone, Debug, Default)]
pub struct ArtifactMaterializer {
    config: MaterializeConfig,
}

impl ArtifactMaterializer {
    /// Create a materializer
    pub fn new(config: MaterializeConfig) -> Self {
        Self { config }
    }

    /// Descriptor for any terminal poll outcome
    pub async fn from_outcome(
        &self,
        job_id: JobId,
        operation_id: &str,
        request: &GenerationRequest,
        outcome: PollOutcome,
    ) -> ArtifactDescriptor {
        let attempts = outcome.attempts();
        let reason = outcome
            .failure_reason()
            .unwrap_or(FailureReason::TimeoutExceeded);
        let message = match outcome {
            PollOutcome::Succeeded { artifact, attempts } => {
                return self
                    .completed(job_id, operation_id, request, artifact, attempts)
                    .await;
            }
            PollOutcome::Failed {
                status, message, ..
            } => format!("provider returned status {status} while polling: {message}"),
            PollOutcome::TimedOut {
                attempts,
                cause: TimeoutCause::BudgetExhausted,
            } => format!("no artifact after {attempts} status checks"),
            PollOutcome::TimedOut {
                attempts,
                cause: TimeoutCause::DeadlineExceeded,
            } => format!("deadline reached after {attempts} status checks"),
            PollOutcome::Cancelled { attempts } => {
                format!("job cancelled after {attempts} status checks")
            }
        };

        self.failed(job_id, Some(operation_id), request, reason, message, attempts)
    }

    /// Materialize a found artifact into a `completed` descriptor
    pub async fn completed(
        &self,
        job_id: JobId,
        operation_id: &str,
        request: &GenerationRequest,
        artifact: ExtractedArtifact,
        attempts: u32,
    ) -> ArtifactDescriptor {
        let content_type = content_type_for(&artifact, request.kind);
        let thumbnail = artifact
            .thumbnail
            .clone()
            .unwrap_or_else(|| placeholder_thumbnail(request.kind, request.settings.aspect_ratio));
        let source = artifact.source;
        let size = artifact.size_bytes;

        let config = self.config.clone();
        let extension = extension_for(&content_type);
        let stored = tokio::task::spawn_blocking(move || {
            write_scoped(&config, job_id, extension, artifact.bytes)
        })
        .await
        .map_err(|e| MaterializationError::Io(std::io::Error::other(e)))
        .and_then(|r| r);

        let (artifact_uri, storage_path) = match stored {
            Ok(Stored::Inline(bytes)) => (data_uri(&content_type, &bytes), None),
            Ok(Stored::Persisted(path)) => match url::Url::from_file_path(&path) {
                Ok(uri) => (uri.to_string(), Some(path)),
                Err(()) => {
                    return self.materialization_failed(
                        job_id,
                        operation_id,
                        request,
                        attempts,
                        MaterializationError::Persist {
                            reason: "path is not absolute".into(),
                            path,
                        },
                    );
                }
            },
            Err(e) => {
                return self.materialization_failed(job_id, operation_id, request, attempts, e);
            }
        };

        info!(
            job_id = %job_id,
            operation = operation_id,
            content_type = %content_type,
            size_bytes = size,
            strategy = %source,
            persisted = storage_path.is_some(),
            "artifact materialized"
        );

        ArtifactDescriptor {
            job_id,
            operation_id: Some(operation_id.to_string()),
            status: ArtifactStatus::Completed,
            content_type: Some(content_type),
            artifact_uri: Some(artifact_uri),
            storage_path,
            thumbnail_uri: Some(thumbnail),
            duration_seconds: duration_for(request),
            size_bytes: Some(size),
            source_strategy: Some(source),
            attempts,
            failure: None,
        }
    }

    /// Build a `failed` descriptor
    pub fn failed(
        &self,
        job_id: JobId,
        operation_id: Option<&str>,
        request: &GenerationRequest,
        reason: FailureReason,
        message: impl Into<String>,
        attempts: u32,
    ) -> ArtifactDescriptor {
        let message = message.into();
        info!(
            job_id = %job_id,
            operation = operation_id.unwrap_or("-"),
            reason = %reason,
            attempts,
            "job finished without artifact"
        );

        ArtifactDescriptor {
            job_id,
            operation_id: operation_id.map(str::to_string),
            status: ArtifactStatus::Failed,
            content_type: None,
            artifact_uri: None,
            storage_path: None,
            thumbnail_uri: None,
            duration_seconds: duration_for(request),
            size_bytes: None,
            source_strategy: None,
            attempts,
            failure: Some(FailureInfo { reason, message }),
        }
    }

    fn materialization_failed(
        &self,
        job_id: JobId,
        operation_id: &str,
        request: &GenerationRequest,
        attempts: u32,
        e: MaterializationError,
    ) -> ArtifactDescriptor {
        error!(job_id = %job_id, operation = operation_id, error = %e, "failed to materialize artifact");
        self.failed(
            job_id,
            Some(operation_id),
            request,
            FailureReason::MaterializationError,
            e.to_string(),
            attempts,
        )
    }
}

/// Write, verify, then drop or persist the temporary file
fn write_scoped(
    config: &MaterializeConfig,
    job_id: JobId,
    extension: &str,
    bytes: Vec<u8>,
) -> Result<Stored, MaterializationError> {
    let prefix = format!("genjob-{job_id}-");
    let suffix = format!(".{extension}");
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(&suffix);

    let mut file = match &config.temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(&bytes)?;
    file.flush()?;

    let written = std::fs::metadata(file.path())?.len() as usize;
    if written != bytes.len() {
        return Err(MaterializationError::SizeMismatch {
            expected: bytes.len(),
            found: written,
        });
    }

    let Some(dir) = &config.persist_dir else {
        // Dropping `file` removes it
        return Ok(Stored::Inline(bytes));
    };

    std::fs::create_dir_all(dir)?;
    let dir = std::fs::canonicalize(dir)?;
    let dest = dir.join(format!("{job_id}.{extension}"));
    file.persist(&dest)
        .map_err(|e| MaterializationError::Persist {
            path: dest.clone(),
            reason: e.error.to_string(),
        })?;
    Ok(Stored::Persisted(dest))
}

fn duration_for(request: &GenerationRequest) -> Option<u32> {
    match request.kind {
        GenerationKind::Video => Some(request.settings.duration),
        GenerationKind::Image => None,
    }
}

/// `data:` URI for `bytes`
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

/// Declared media type, else sniffed, else the kind's default
fn content_type_for(artifact: &ExtractedArtifact, kind: GenerationKind) -> String {
    artifact
        .mime_type
        .as_deref()
        .filter(|m| m.starts_with("video/") || m.starts_with("image/"))
        .or_else(|| sniff_content_type(&artifact.bytes))
        .unwrap_or_else(|| kind.default_content_type())
        .to_string()
}

/// Guess a media type from magic bytes
#[must_use]
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(if &bytes[8..12] == b"qt  " {
            "video/quicktime"
        } else {
            "video/mp4"
        });
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// SVG placeholder sized to the aspect ratio, as a `data:` URI
pub fn placeholder_thumbnail(kind: GenerationKind, aspect_ratio: AspectRatio) -> String {
    let (w, h) = aspect_ratio.thumbnail_dimensions();
    let (cx, cy) = (w / 2, h / 2);
    let r = w.min(h) / 6;

    let glyph = match kind {
        GenerationKind::Video => format!(
            r##"<polygon points="{},{} {},{} {},{}" fill="#e5e7eb"/>"##,
            cx - r / 2,
            cy - r,
            cx - r / 2,
            cy + r,
            cx + r,
            cy
        ),
        GenerationKind::Image => format!(
            r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#e5e7eb" stroke-width="4"/>"##,
            cx - r,
            cy - r,
            2 * r,
            2 * r
        ),
    };

    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="{w}" height="{h}" fill="#1f2937"/>{glyph}</svg>"##
    );
    data_uri("image/svg+xml", svg.as_bytes())
}
