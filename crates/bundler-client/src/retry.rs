//! Bounded retry with exponential backoff and jitter.
//!
//! The operation decides per failure whether another attempt makes sense:
//! it returns [`Attempt::Retry`] for transient errors and [`Attempt::Bail`]
//! to stop immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::debug;

/// How a failed attempt should be handled.
#[derive(Debug)]
pub enum Attempt<E> {
    Retry(E),
    Bail(E),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_timeout_ms: 1_000,
            max_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min * 2^(retry-1)`,
    /// capped at `max`, plus up to 10% jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(retry - 1);
        let capped = self
            .min_timeout_ms
            .saturating_mul(factor)
            .min(self.max_timeout_ms.max(self.min_timeout_ms));

        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op` until it succeeds, bails, or the attempts run out.
///
/// `op` receives the 1-based attempt number. The last error is returned.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(Attempt::Bail(e)) => return Err(e),
            Err(Attempt::Retry(e)) if attempt >= attempts => return Err(e),
            Err(Attempt::Retry(e)) => {
                let delay = policy.backoff(attempt);
                debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
