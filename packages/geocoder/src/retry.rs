//! Timeout and retry helpers for geocoding lookups.
//!
//! Every provider call made by the resolver goes through
//! [`retry_with_backoff`] wrapping [`with_timeout`]:
//!
//! ```ignore
//! let location = retry::retry_with_backoff(&policy, "postcodes_io", || {
//!     retry::with_timeout(timeout, strategy.lookup(&term))
//! })
//! .await?;
//! ```
//!
//! Only errors classified as transient (network failures, timeouts, rate
//! limiting) are retried. Invalid input and "no match" answers are
//! returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;

/// Exponential backoff settings.
///
/// The delay before retry `n` (zero-based) is
/// `min(initial_delay_ms * backoff_factor^n, max_delay_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            backoff_factor: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Races `fut` against a timer.
///
/// When the timer wins, `fut` is dropped (cancelling any in-flight HTTP
/// request) and [`GeocodeError::Timeout`] is returned.
///
/// # Errors
///
/// Returns the future's own error, or [`GeocodeError::Timeout`].
pub async fn with_timeout<T, F>(after: Duration, fut: F) -> Result<T, GeocodeError>
where
    F: Future<Output = Result<T, GeocodeError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| GeocodeError::Timeout { after })?
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Attempts are strictly sequential.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, GeocodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeocodeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                log::warn!("  {label}: transient error: {e}");
                log::warn!("  {label}: retry {attempt}/{} in {delay:?}...", max_attempts - 1);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
