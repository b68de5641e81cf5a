//! Retry with exponential backoff for artifact downloads
//!
//! The polling loop has its own fixed cadence and never goes through this
//! module. Submission is never retried. What remains is fetching artifact
//! bytes delivered by reference, where a dropped connection or a 5xx from
//! the storage host should not throw away a finished generation.
//!
//! # Example
//!
//! ```no_run
//! use genjob::retry::{IsRetryable, with_retry};
//! use genjob::clock::TokioClock;
//! use genjob::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Busy,
//!     Gone,
//! }
//!
//! impl std::fmt::Display for FetchError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, FetchError::Busy)
//!     }
//! }
//!
//! # async fn example() -> Result<(), FetchError> {
//! let config = RetryConfig::default();
//! let bytes = with_retry(&config, &TokioClock, || async { Ok::<_, FetchError>(vec![0u8; 16]) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::clock::Clock;
use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as transient or permanent
pub trait IsRetryable {
    /// Returns true if the operation should be tried again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for reqwest::Error {
    fn is_retryable(&self) -> bool {
        self.is_timeout() || self.is_connect() || self.status().is_some_and(|s| s.is_server_error())
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. Backoff waits go through `clock`.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    clock: &dyn Clock,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "operation failed, retrying"
                );

                clock.sleep(wait).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "non-retryable failure");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a uniform factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
