//! Injectable clock for the polling loop
//!
//! The poller, its time bounds and the download backoff only ever wait
//! through a [`Clock`], so tests can run the full two-minute-plus-thirty-attempts
//! schedule in virtual time with [`ManualClock`], and a [`CancellationToken`]
//! can interrupt any sleep.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Source of time and sleeps
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);

    /// Resolve once `duration` of clock time has passed
    ///
    /// Unlike [`sleep`](Self::sleep) this never moves time forward itself;
    /// it bounds other work racing against it.
    async fn timer(&self, duration: Duration);
}

/// Real time, backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn timer(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time: `sleep` advances the clock and returns immediately
///
/// # Example
///
/// ```
/// use genjob::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let clock = ManualClock::new();
/// clock.sleep(Duration::from_secs(120)).await;
/// assert_eq!(clock.elapsed(), Duration::from_secs(120));
/// assert_eq!(clock.sleep_count(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed_nanos: AtomicU64,
    sleeps: AtomicU32,
    advanced: Notify,
}

impl ManualClock {
    /// Create a clock at virtual time zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: AtomicU64::new(0),
            sleeps: AtomicU32::new(0),
            advanced: Notify::new(),
        }
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }

    /// Move virtual time forward without counting a sleep
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }

    /// Number of `sleep` calls so far
    pub fn sleep_count(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    /// Pends until sleeps elsewhere carry virtual time past `duration`
    async fn timer(&self, duration: Duration) {
        let target = self.elapsed().saturating_add(duration);
        loop {
            let advanced = self.advanced.notified();
            tokio::pin!(advanced);
            // Register before checking so an advance in between is not lost
            advanced.as_mut().enable();
            if self.elapsed() >= target {
                return;
            }
            advanced.await;
        }
    }
}

/// Sleep on `clock` unless `cancel` fires first
///
/// Returns `false` when cancelled. A token that is already cancelled wins
/// without sleeping.
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    duration: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = clock.sleep(duration) => true,
    }
}

/// Run `work` unless `limit` of clock time passes first
///
/// Returns `None` when the limit won. A limit that expires in the same poll
/// as `work` completes still wins.
pub async fn within<F: Future>(clock: &dyn Clock, limit: Duration, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = clock.timer(limit) => None,
        out = work => Some(out),
    }
}
