//! Artifact extraction from unstable provider responses
//!
//! The provider's poll responses change shape between attempts and are not
//! documented, so [`ResultExtractor`] runs an ordered chain of independent
//! strategies over each response. The first candidate that validates wins:
//!
//! 1. [`DirectField`] - a well-known top-level field
//! 2. [`PredictionField`] - priority list on `predictions[0]`
//! 3. [`MimeDeclaredScan`] - longest string on a prediction declaring a media type
//! 4. [`WholeResponseString`] - the body is the payload
//! 5. [`GlobalBase64Scan`] - longest base64 run in the serialized body
//! 6. [`RecursiveWalk`] - first large unstructured string, depth first
//!
//! Locating candidates is pure. Validation decodes base64 (or unwraps a
//! `data:` URI), or follows an HTTP(S)/`gs://` reference through an
//! [`ArtifactFetcher`], then insists the bytes exceed the minimum plausible
//! size. Validation failures are logged and the chain moves on; they never
//! fail the poll attempt.

mod payload;
mod strategies;

pub use payload::{Payload, classify, decode_base64, is_reference};
pub use strategies::{
    Candidate, DirectField, ExtractionStrategy, GlobalBase64Scan, MimeDeclaredScan,
    PredictionField, RecursiveWalk, WholeResponseString,
};

use crate::config::{ExtractionConfig, FieldProfile};
use crate::error::ExtractionError;
use crate::provider::ArtifactFetcher;
use crate::types::{ExtractedArtifact, GenerationKind, SourceStrategy};
use serde_json::Value;
use strategies::{declared_mime, first_prediction};
use tracing::{debug, warn};

/// Ordered chain of extraction strategies for one kind of media
pub struct ResultExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    thumbnail_fields: Vec<String>,
    min_plausible_size: usize,
}

impl ResultExtractor {
    /// Build the standard six-strategy chain for `kind`
    pub fn for_kind(config: &ExtractionConfig, kind: GenerationKind) -> Self {
        let profile = match kind {
            GenerationKind::Video => &config.video,
            GenerationKind::Image => &config.image,
        };
        Self::with_profile(config, profile)
    }

    /// Build the standard chain from an explicit field profile
    pub fn with_profile(config: &ExtractionConfig, profile: &FieldProfile) -> Self {
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(DirectField::new(profile.direct_fields.clone())),
            Box::new(PredictionField::new(profile.prediction_fields.clone())),
            Box::new(MimeDeclaredScan::new(
                profile.prediction_fields.clone(),
                config.min_candidate_len,
            )),
            Box::new(WholeResponseString::new(config.min_candidate_len)),
            Box::new(GlobalBase64Scan::new(config.min_base64_run)),
            Box::new(RecursiveWalk::new(config.min_candidate_len)),
        ];

        Self::from_strategies(
            strategies,
            profile.thumbnail_fields.clone(),
            config.min_plausible_size,
        )
    }

    /// Build a chain from arbitrary strategies
    pub fn from_strategies(
        strategies: Vec<Box<dyn ExtractionStrategy>>,
        thumbnail_fields: Vec<String>,
        min_plausible_size: usize,
    ) -> Self {
        Self {
            strategies,
            thumbnail_fields,
            min_plausible_size,
        }
    }

    /// Every candidate the chain would consider for `response`, in order
    ///
    /// Pure: the same response always yields the same candidates.
    pub fn candidates<'a>(&self, response: &'a Value) -> Vec<Candidate<'a>> {
        self.strategies
            .iter()
            .filter_map(|strategy| strategy.attempt(response))
            .collect()
    }

    /// Extract without following references
    ///
    /// Remote candidates count as misses. Pure and idempotent.
    pub fn extract_inline(&self, response: &Value) -> Option<ExtractedArtifact> {
        self.candidates(response).into_iter().find_map(|candidate| {
            let source = candidate.source;
            match classify(&candidate.value) {
                Ok(Payload::Inline { bytes, mime_type }) => self
                    .check_size(bytes, source)
                    .ok()
                    .map(|artifact| self.annotate(artifact, &candidate, mime_type, response)),
                Ok(Payload::Remote(_)) | Err(_) => None,
            }
        })
    }

    /// Run the chain over one poll response
    ///
    /// Returns the first candidate that validates, or `None` when the
    /// response holds nothing usable yet.
    pub async fn extract(
        &self,
        response: &Value,
        fetcher: &dyn ArtifactFetcher,
    ) -> Option<ExtractedArtifact> {
        for strategy in &self.strategies {
            let kind = strategy.kind();
            let Some(candidate) = strategy.attempt(response) else {
                debug!(strategy = %kind, "no candidate");
                continue;
            };

            match self.validate(&candidate, fetcher).await {
                Ok((artifact, mime_type)) => {
                    debug!(strategy = %kind, size = artifact.size_bytes, "candidate accepted");
                    return Some(self.annotate(artifact, &candidate, mime_type, response));
                }
                Err(ExtractionError::TooSmall { size, min }) => {
                    debug!(strategy = %kind, size, min, "candidate too small");
                }
                Err(e) => {
                    warn!(strategy = %kind, error = %e, "candidate rejected");
                }
            }
        }
        None
    }

    async fn validate(
        &self,
        candidate: &Candidate<'_>,
        fetcher: &dyn ArtifactFetcher,
    ) -> Result<(ExtractedArtifact, Option<String>), ExtractionError> {
        match classify(&candidate.value)? {
            Payload::Inline { bytes, mime_type } => {
                Ok((self.check_size(bytes, candidate.source)?, mime_type))
            }
            Payload::Remote(reference) => {
                let bytes = fetcher.fetch(&reference).await?;
                let mut artifact = self.check_size(bytes, candidate.source)?;
                artifact.origin_url = Some(reference);
                Ok((artifact, None))
            }
        }
    }

    fn check_size(
        &self,
        bytes: Vec<u8>,
        source: SourceStrategy,
    ) -> Result<ExtractedArtifact, ExtractionError> {
        let size = bytes.len();
        ExtractedArtifact::accept(bytes, source, self.min_plausible_size).ok_or(
            ExtractionError::TooSmall {
                size,
                min: self.min_plausible_size,
            },
        )
    }

    /// Attach the MIME type and thumbnail the response declares
    fn annotate(
        &self,
        mut artifact: ExtractedArtifact,
        candidate: &Candidate<'_>,
        payload_mime: Option<String>,
        response: &Value,
    ) -> ExtractedArtifact {
        artifact.mime_type = payload_mime
            .or_else(|| candidate.mime_type.clone())
            .or_else(|| response_mime(response));
        artifact.thumbnail = self.thumbnail(response);
        artifact
    }

    /// Provider thumbnail, from the top level or the first prediction
    pub fn thumbnail(&self, response: &Value) -> Option<String> {
        let scopes = [Some(response), first_prediction(response)];
        scopes.into_iter().flatten().find_map(|scope| {
            self.thumbnail_fields
                .iter()
                .filter_map(|field| scope.get(field.as_str()).and_then(Value::as_str))
                .find(|s| !s.trim().is_empty())
                .map(str::to_string)
        })
    }
}

/// Media MIME type declared at the top level or on the first prediction
fn response_mime(response: &Value) -> Option<String> {
    [Some(response), first_prediction(response)]
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .find_map(declared_mime)
        .map(str::to_string)
}
