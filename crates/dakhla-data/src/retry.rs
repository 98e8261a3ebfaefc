//! Retry wrapper for transient source failures.
//!
//! The policy (attempts, backoff, jitter) is explicit configuration; the
//! wrapper composes with the rate limiter at the call site. Only errors
//! classified as transient are retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use dakhla_traits::Result;

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first try.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each failure.
    pub backoff_factor: f64,
    /// Symmetric jitter fraction applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy with a custom attempt budget and the default backoff curve.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Jittered delay before attempt `attempt` (1-based; no delay before
    /// the first attempt).
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * self.backoff_factor.powi(attempt as i32 - 1);
        let jitter = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::from_millis((base * (1.0 + jitter)).max(0.0) as u64)
    }
}

/// Run `op` under the retry policy, retrying only transient failures.
///
/// Non-transient errors (not-found, temporal violations, integrity
/// problems) are returned immediately.
///
/// # Errors
///
/// Returns the final error once the attempt budget is exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(attempt, ?delay, %err, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
