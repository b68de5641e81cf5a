//! Shutdown coordination.

use crate::error::Result;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::JobHandler;

/// How long shutdown waits for cancelled jobs to write their descriptors
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl JobHandler {
    /// Stop accepting jobs and cancel every job in flight
    ///
    /// Cancelled jobs resolve into `failed` descriptors with reason
    /// `Cancelled`. Waits up to 30 seconds for them to get there.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` leaves room for flushing
    /// persisted state.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.shutdown.cancel();
        tracing::info!("Signaled cancellation to all active jobs");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs finished"),
            Err(_) => tracing::warn!("Timeout waiting for jobs to finish, proceeding with shutdown"),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new jobs are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.tracker.active_count().await;
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active jobs to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
