//! Bounded polling of a long-running operation
//!
//! [`OperationPoller`] waits once, then checks the operation at a fixed
//! interval until an artifact turns up, the provider answers with a fatal
//! status, attempts run out, the deadline passes, or the job is cancelled.
//!
//! ```text
//! Waiting --initial delay--> Polling --artifact--> Succeeded
//!                               |  \--fatal status--> Failed
//!                               |   \--budget/attempts--> TimedOut
//!                               \--cancel--> Cancelled
//! ```
//!
//! All suspension goes through the injected [`Clock`] and races the job's
//! [`CancellationToken`].

use crate::clock::{Clock, sleep_or_cancel, within};
use crate::config::PollingConfig;
use crate::error::{FailureReason, PollError};
use crate::extract::ResultExtractor;
use crate::provider::{ArtifactFetcher, StatusSource};
use crate::types::{AttemptOutcome, ExtractedArtifact, OperationHandle, PollAttempt};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a job ran out of time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutCause {
    /// The polling budget (`initial_delay + max_attempts × interval`) or the
    /// attempt count ran out
    BudgetExhausted,
    /// A shorter caller deadline or host cap ran out first
    DeadlineExceeded,
}

/// Terminal result of a polling loop
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// An artifact was extracted
    Succeeded {
        /// The artifact
        artifact: ExtractedArtifact,
        /// Fetch-status calls made
        attempts: u32,
    },
    /// The provider answered with a terminal status
    Failed {
        /// HTTP status
        status: u16,
        /// Response body (truncated)
        message: String,
        /// Fetch-status calls made
        attempts: u32,
    },
    /// No artifact within the budget
    TimedOut {
        /// Fetch-status calls made
        attempts: u32,
        /// Which limit was hit
        cause: TimeoutCause,
    },
    /// The cancellation token fired
    Cancelled {
        /// Fetch-status calls made
        attempts: u32,
    },
}

impl PollOutcome {
    /// Fetch-status calls made
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }

    /// Reason code for non-success outcomes
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            PollOutcome::Succeeded { .. } => None,
            PollOutcome::Failed { .. } => Some(FailureReason::PollFatalError),
            PollOutcome::TimedOut {
                cause: TimeoutCause::BudgetExhausted,
                ..
            } => Some(FailureReason::TimeoutExceeded),
            PollOutcome::TimedOut {
                cause: TimeoutCause::DeadlineExceeded,
                ..
            } => Some(FailureReason::DeadlineExceeded),
            PollOutcome::Cancelled { .. } => Some(FailureReason::Cancelled),
        }
    }
}

/// Progress callbacks from the polling loop
///
/// Observers never influence timing.
#[async_trait]
pub trait PollObserver: Send + Sync {
    /// The loop is about to sleep through the initial delay
    async fn waiting(&self, _delay: Duration) {}

    /// A fetch-status call completed and was classified
    async fn attempted(&self, _attempt: &PollAttempt, _max_attempts: u32) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PollObserver for NoopObserver {}

/// What to poll and how to read the answers
pub struct PollTarget<'a> {
    /// Operation being polled
    pub handle: &'a OperationHandle,
    /// Fetch-status implementation
    pub source: &'a dyn StatusSource,
    /// Extraction chain for the job's media kind
    pub extractor: &'a ResultExtractor,
    /// Follows artifact references
    pub fetcher: &'a dyn ArtifactFetcher,
}

enum Pause {
    Elapsed,
    Cancelled,
    DeadlineReached,
}

/// Drives the polling state machine
pub struct OperationPoller {
    config: PollingConfig,
    clock: Arc<dyn Clock>,
}

impl OperationPoller {
    /// Create a poller with the given cadence
    pub fn new(config: PollingConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Polling configuration
    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Effective wall-clock budget given an optional caller deadline
    pub fn effective_budget(&self, deadline: Option<Duration>) -> Duration {
        [Some(self.config.budget()), self.config.max_job_duration, deadline]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or_else(|| self.config.budget())
    }

    /// Poll `target` until a terminal outcome
    ///
    /// Makes at most `max_attempts` fetch-status calls. Sleeps are capped at
    /// the remaining budget, and a fetch or artifact download still in flight
    /// when the budget runs out is abandoned.
    pub async fn run(
        &self,
        target: PollTarget<'_>,
        observer: &dyn PollObserver,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> PollOutcome {
        let budget = self.effective_budget(deadline);
        let deadline_at = self.clock.now() + budget;
        let expiry = if budget < self.config.budget() {
            TimeoutCause::DeadlineExceeded
        } else {
            TimeoutCause::BudgetExhausted
        };
        let operation = target.handle.name.as_str();

        debug!(
            operation,
            initial_delay_secs = self.config.initial_delay.as_secs(),
            budget_secs = budget.as_secs(),
            "waiting before first poll"
        );
        observer.waiting(self.config.initial_delay).await;

        match self.pause(self.config.initial_delay, deadline_at, cancel).await {
            Pause::Elapsed => {}
            Pause::Cancelled => return PollOutcome::Cancelled { attempts: 0 },
            Pause::DeadlineReached => {
                return PollOutcome::TimedOut {
                    attempts: 0,
                    cause: expiry,
                };
            }
        }

        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;

        loop {
            let remaining = deadline_at.saturating_duration_since(self.clock.now());
            if remaining.is_zero() {
                return PollOutcome::TimedOut {
                    attempts,
                    cause: expiry,
                };
            }

            attempts += 1;
            if attempts == 1 {
                info!(operation, "first status check");
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
                r = within(self.clock.as_ref(), remaining, target.source.fetch_status(target.handle)) => r,
            };

            let Some(result) = fetched else {
                warn!(operation, attempt = attempts, "status check outlived the polling budget");
                return PollOutcome::TimedOut {
                    attempts,
                    cause: expiry,
                };
            };

            let mut record = PollAttempt {
                index: attempts,
                at: chrono::Utc::now(),
                http_status: None,
                response: None,
                outcome: AttemptOutcome::Pending,
            };

            match result {
                Ok(body) => {
                    record.http_status = Some(200);
                    let remaining = deadline_at.saturating_duration_since(self.clock.now());
                    let extracted = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
                        a = within(self.clock.as_ref(), remaining, target.extractor.extract(&body, target.fetcher)) => a,
                    };
                    let Some(extracted) = extracted else {
                        warn!(operation, attempt = attempts, "artifact download outlived the polling budget");
                        return PollOutcome::TimedOut {
                            attempts,
                            cause: expiry,
                        };
                    };
                    record.response = Some(body);

                    if let Some(artifact) = extracted {
                        record.outcome = AttemptOutcome::Succeeded;
                        observer.attempted(&record, max_attempts).await;
                        info!(
                            operation,
                            attempt = attempts,
                            strategy = %artifact.source,
                            size_bytes = artifact.size_bytes,
                            "artifact extracted"
                        );
                        return PollOutcome::Succeeded { artifact, attempts };
                    }
                    debug!(operation, attempt = attempts, "response holds no artifact yet");
                }
                Err(PollError::NotReady { status }) => {
                    record.http_status = Some(status);
                    debug!(operation, attempt = attempts, status, "operation not ready");
                }
                Err(PollError::Transport(e)) => {
                    warn!(operation, attempt = attempts, error = %e, "status check failed, will retry");
                }
                Err(PollError::Fatal { status, body }) => {
                    record.http_status = Some(status);
                    record.outcome = AttemptOutcome::FatalError;
                    observer.attempted(&record, max_attempts).await;
                    warn!(operation, attempt = attempts, status, "status check failed fatally");
                    return PollOutcome::Failed {
                        status,
                        message: body,
                        attempts,
                    };
                }
            }

            observer.attempted(&record, max_attempts).await;

            if attempts >= max_attempts {
                return PollOutcome::TimedOut {
                    attempts,
                    cause: TimeoutCause::BudgetExhausted,
                };
            }

            match self.pause(self.config.interval, deadline_at, cancel).await {
                Pause::Elapsed => {}
                Pause::Cancelled => return PollOutcome::Cancelled { attempts },
                Pause::DeadlineReached => {
                    return PollOutcome::TimedOut {
                        attempts,
                        cause: expiry,
                    };
                }
            }
        }
    }

    /// Sleep for `wanted`, but never past `deadline_at`
    async fn pause(&self, wanted: Duration, deadline_at: Instant, cancel: &CancellationToken) -> Pause {
        let remaining = deadline_at.saturating_duration_since(self.clock.now());
        if remaining.is_zero() && !wanted.is_zero() {
            return Pause::DeadlineReached;
        }

        let wait = wanted.min(remaining);
        if !sleep_or_cancel(self.clock.as_ref(), wait, cancel).await {
            return Pause::Cancelled;
        }
        if wait < wanted {
            Pause::DeadlineReached
        } else {
            Pause::Elapsed
        }
    }
}
