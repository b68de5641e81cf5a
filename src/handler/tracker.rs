//! In-memory job progress tracking.

use crate::poller::PollObserver;
use crate::types::{Event, GenerationKind, JobId, JobPhase, JobStatus, PollAttempt};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Upper bound on tracked jobs; the oldest finished entries are evicted first
pub const MAX_TRACKED_JOBS: usize = 1000;

/// Coarse phase per job, shared with the HTTP layer
#[derive(Clone, Default)]
pub(crate) struct JobTracker {
    jobs: Arc<RwLock<HashMap<JobId, JobStatus>>>,
}

impl JobTracker {
    /// Start tracking a job in the `submitting` phase
    pub(crate) async fn start(&self, job_id: JobId, kind: GenerationKind) {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        if jobs.len() >= MAX_TRACKED_JOBS {
            let count = jobs_to_drop(jobs.len());
            prune_finished(&mut jobs, count);
        }

        jobs.insert(
            job_id,
            JobStatus {
                job_id,
                kind,
                operation_id: None,
                phase: JobPhase::Submitting,
                started_at: now,
                updated_at: now,
            },
        );
    }

    pub(crate) async fn set_operation(&self, job_id: JobId, operation_id: &str) {
        if let Some(status) = self.jobs.write().await.get_mut(&job_id) {
            status.operation_id = Some(operation_id.to_string());
            status.updated_at = Utc::now();
        }
    }

    pub(crate) async fn set_phase(&self, job_id: JobId, phase: JobPhase) {
        if let Some(status) = self.jobs.write().await.get_mut(&job_id) {
            status.phase = phase;
            status.updated_at = Utc::now();
        }
    }

    pub(crate) async fn get(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// All tracked jobs, oldest first
    pub(crate) async fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<JobStatus> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|s| s.started_at);
        jobs
    }

    /// Jobs that have not reached a terminal phase
    pub(crate) async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|s| !s.phase.is_terminal())
            .count()
    }
}

fn jobs_to_drop(len: usize) -> usize {
    len + 1 - MAX_TRACKED_JOBS
}

/// Drop up to `count` finished jobs, oldest first. Running jobs are never evicted.
fn prune_finished(jobs: &mut HashMap<JobId, JobStatus>, count: usize) {
    let mut finished: Vec<(JobId, chrono::DateTime<Utc>)> = jobs
        .values()
        .filter(|s| s.phase.is_terminal())
        .map(|s| (s.job_id, s.updated_at))
        .collect();
    finished.sort_by_key(|(_, at)| *at);

    for (id, _) in finished.into_iter().take(count) {
        jobs.remove(&id);
    }
}

/// Bridges poll progress into the tracker and the event channel
pub(crate) struct TrackerObserver {
    pub(crate) job_id: JobId,
    pub(crate) tracker: JobTracker,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

#[async_trait]
impl PollObserver for TrackerObserver {
    async fn waiting(&self, delay: Duration) {
        self.tracker
            .set_phase(
                self.job_id,
                JobPhase::Waiting {
                    delay_secs: delay.as_secs(),
                },
            )
            .await;
    }

    async fn attempted(&self, attempt: &PollAttempt, max_attempts: u32) {
        self.tracker
            .set_phase(
                self.job_id,
                JobPhase::Polling {
                    attempt: attempt.index,
                    max_attempts,
                },
            )
            .await;

        self.event_tx
            .send(Event::PollAttempted {
                job_id: self.job_id,
                attempt: attempt.index,
                outcome: attempt.outcome,
            })
            .ok();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    #[tokio::test]
    async fn test_phase_transitions_are_recorded() {
        let tracker = JobTracker::default();
        let id = JobId::new();

        tracker.start(id, GenerationKind::Video).await;
        tracker.set_operation(id, "op-1").await;
        tracker
            .set_phase(
                id,
                JobPhase::Polling {
                    attempt: 2,
                    max_attempts: 30,
                },
            )
            .await;

        let status = tracker.get(id).await.unwrap();
        assert_eq!(status.operation_id.as_deref(), Some("op-1"));
        assert!(matches!(status.phase, JobPhase::Polling { attempt: 2, .. }));
        assert_eq!(tracker.active_count().await, 1);

        tracker
            .set_phase(
                id,
                JobPhase::Failed {
                    reason: FailureReason::TimeoutExceeded,
                },
            )
            .await;
        assert_eq!(tracker.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_job_updates_are_ignored() {
        let tracker = JobTracker::default();
        tracker.set_phase(JobId::new(), JobPhase::Completed).await;
        assert!(tracker.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_running_jobs() {
        let tracker = JobTracker::default();
        let running = JobId::new();
        tracker.start(running, GenerationKind::Video).await;

        for _ in 0..MAX_TRACKED_JOBS + 5 {
            let id = JobId::new();
            tracker.start(id, GenerationKind::Image).await;
            tracker.set_phase(id, JobPhase::Completed).await;
        }

        let jobs = tracker.list().await;
        assert!(jobs.len() <= MAX_TRACKED_JOBS);
        assert!(tracker.get(running).await.is_some());
    }

    #[tokio::test]
    async fn test_observer_emits_poll_events() {
        let tracker = JobTracker::default();
        let (event_tx, mut rx) = broadcast::channel(16);
        let id = JobId::new();
        tracker.start(id, GenerationKind::Video).await;

        let observer = TrackerObserver {
            job_id: id,
            tracker: tracker.clone(),
            event_tx,
        };
        observer.waiting(Duration::from_secs(120)).await;
        assert!(matches!(
            tracker.get(id).await.unwrap().phase,
            JobPhase::Waiting { delay_secs: 120 }
        ));

        let attempt = PollAttempt {
            index: 1,
            at: Utc::now(),
            http_status: Some(200),
            response: None,
            outcome: crate::types::AttemptOutcome::Pending,
        };
        observer.attempted(&attempt, 30).await;

        match rx.recv().await.unwrap() {
            Event::PollAttempted { attempt, .. } => assert_eq!(attempt, 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
