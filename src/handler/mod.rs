//! Job orchestration
//!
//! [`JobHandler`] is the composition root: it owns the injected HTTP client,
//! the credential provider and the clock, and drives one request through
//! submit, poll, extract and materialize.
//!
//! Only a [`SubmissionError`](crate::error::SubmissionError) comes back as an
//! `Err`. Every failure after the provider accepted the job resolves into a
//! `failed` [`ArtifactDescriptor`].

mod lifecycle;
mod tracker;

pub use tracker::MAX_TRACKED_JOBS;

use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::credentials::{self, CredentialProvider};
use crate::error::{Error, FailureReason, Result};
use crate::extract::ResultExtractor;
use crate::materialize::ArtifactMaterializer;
use crate::poller::{OperationPoller, PollOutcome, PollTarget};
use crate::provider::{ProviderArtifactFetcher, ProviderClient, ProviderStatusSource};
use crate::submit::JobSubmitter;
use crate::types::{ArtifactDescriptor, Event, GenerationRequest, JobId, JobPhase, JobStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracker::{JobTracker, TrackerObserver};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Per-run overrides
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// External cancellation, e.g. the caller went away
    pub cancel: Option<CancellationToken>,
    /// Wall-clock deadline for the polling phase, shorter than the configured budget
    pub deadline: Option<Duration>,
}

/// Runs generation jobs end to end
pub struct JobHandler {
    config: Config,
    provider: Arc<ProviderClient>,
    clock: Arc<dyn Clock>,
    submitter: JobSubmitter,
    poller: OperationPoller,
    materializer: ArtifactMaterializer,
    tracker: JobTracker,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
    accepting: AtomicBool,
}

impl JobHandler {
    /// Build a handler from configuration, using real time
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built or no credential source is configured.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use genjob::{Config, GenerationRequest, JobHandler};
    ///
    /// # async fn example() -> genjob::Result<()> {
    /// let mut config = Config::default();
    /// config.provider.project_id = "my-project".into();
    /// config.credentials.static_token = Some("ya29.token".into());
    ///
    /// let handler = JobHandler::new(config)?;
    /// let descriptor = handler.run(GenerationRequest::video("a koi pond at dawn")).await?;
    /// println!("{:?} {:?}", descriptor.status, descriptor.artifact_uri);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        let credentials = credentials::from_config(&config.credentials)?;
        Self::with_parts(config, credentials, Arc::new(TokioClock))
    }

    /// Build a handler with an explicit credential provider and clock
    pub fn with_parts(
        config: Config,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let provider = Arc::new(ProviderClient::new(config.provider.clone())?);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            submitter: JobSubmitter::new(provider.clone(), credentials),
            poller: OperationPoller::new(config.polling.clone(), clock.clone()),
            clock,
            materializer: ArtifactMaterializer::new(config.materialize.clone()),
            provider,
            config,
            tracker: JobTracker::default(),
            event_tx,
            shutdown: CancellationToken::new(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to job events
    ///
    /// Slow subscribers miss events rather than slowing jobs down.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Progress snapshot for one job
    pub async fn job_status(&self, job_id: JobId) -> Option<JobStatus> {
        self.tracker.get(job_id).await
    }

    /// Progress snapshots for all tracked jobs, oldest first
    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        self.tracker.list().await
    }

    /// Run one job with default options
    ///
    /// # Errors
    /// [`Error::Submission`] if the job never started, [`Error::ShuttingDown`]
    /// after [`shutdown`](Self::shutdown).
    pub async fn run(&self, request: GenerationRequest) -> Result<ArtifactDescriptor> {
        self.run_with(request, RunOptions::default()).await
    }

    /// Run one job
    ///
    /// # Errors
    /// Same as [`run`](Self::run).
    pub async fn run_with(
        &self,
        request: GenerationRequest,
        options: RunOptions,
    ) -> Result<ArtifactDescriptor> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let job_id = JobId::new();
        let token = self.job_token(options.cancel);
        // Cancelling on exit also stops the link task spawned for external tokens
        let _guard = token.clone().drop_guard();

        self.tracker.start(job_id, request.kind).await;
        self.emit_event(Event::JobAccepted {
            job_id,
            kind: request.kind,
        });

        let submitted = match self.submitter.submit(&request).await {
            Ok(submitted) => submitted,
            Err(e) => {
                tracing::error!(job_id = %job_id, kind = %request.kind, error = %e, "submission failed");
                self.tracker.set_phase(job_id, JobPhase::Rejected).await;
                self.emit_event(Event::JobRejected {
                    job_id,
                    error: e.to_string(),
                });
                return Err(Error::Submission(e));
            }
        };

        let handle = submitted.handle;
        tracing::info!(
            job_id = %job_id,
            operation = %handle.name,
            kind = %request.kind,
            "job submitted"
        );
        self.tracker.set_operation(job_id, &handle.name).await;
        self.emit_event(Event::JobSubmitted {
            job_id,
            operation_id: handle.name.clone(),
        });

        let source = ProviderStatusSource::new(
            self.provider.clone(),
            submitted.credential.clone(),
            &self.config.polling,
        );
        let fetcher = ProviderArtifactFetcher::new(
            self.provider.clone(),
            submitted.credential,
            self.config.download_retry.clone(),
            self.clock.clone(),
        );
        let extractor = ResultExtractor::for_kind(&self.config.extraction, request.kind);
        let observer = TrackerObserver {
            job_id,
            tracker: self.tracker.clone(),
            event_tx: self.event_tx.clone(),
        };

        let outcome = self
            .poller
            .run(
                PollTarget {
                    handle: &handle,
                    source: &source,
                    extractor: &extractor,
                    fetcher: &fetcher,
                },
                &observer,
                &token,
                options.deadline,
            )
            .await;

        if matches!(outcome, PollOutcome::Succeeded { .. }) {
            self.tracker.set_phase(job_id, JobPhase::Materializing).await;
        }

        let descriptor = self
            .materializer
            .from_outcome(job_id, &handle.name, &request, outcome)
            .await;

        self.finish(&descriptor).await;
        Ok(descriptor)
    }

    /// Record the terminal phase and announce it
    async fn finish(&self, descriptor: &ArtifactDescriptor) {
        let job_id = descriptor.job_id;

        match (&descriptor.failure, descriptor.source_strategy) {
            (None, Some(strategy)) => {
                tracing::info!(
                    job_id = %job_id,
                    attempts = descriptor.attempts,
                    strategy = %strategy,
                    "job completed"
                );
                self.tracker.set_phase(job_id, JobPhase::Completed).await;
                self.emit_event(Event::JobCompleted {
                    job_id,
                    strategy,
                    size_bytes: descriptor.size_bytes.unwrap_or_default(),
                });
            }
            (failure, _) => {
                let reason = failure
                    .as_ref()
                    .map(|f| f.reason)
                    .unwrap_or(FailureReason::MaterializationError);
                tracing::info!(
                    job_id = %job_id,
                    attempts = descriptor.attempts,
                    reason = %reason,
                    "job failed"
                );
                self.tracker
                    .set_phase(job_id, JobPhase::Failed { reason })
                    .await;
                self.emit_event(Event::JobFailed { job_id, reason });
            }
        }
    }

    /// Cancellation token for one job
    ///
    /// A child of the shutdown token, additionally cancelled when `external` is.
    fn job_token(&self, external: Option<CancellationToken>) -> CancellationToken {
        let token = self.shutdown.child_token();

        if let Some(external) = external {
            if external.is_cancelled() {
                token.cancel();
                return token;
            }
            let linked = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => linked.cancel(),
                    _ = linked.cancelled() => {}
                }
            });
        }

        token
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
