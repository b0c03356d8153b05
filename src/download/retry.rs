//! Per-request retry policy.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// How often and how patiently a single request is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Zero retries immediately; otherwise `backoff * attempt` plus jitter.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let base = self.backoff.saturating_mul(attempt);
        let jitter_ms = (self.backoff.as_millis() as u64 / 2).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

/// Run `operation` until it succeeds, the budget is spent or `cancel` fires.
///
/// Returns the value with the number of attempts it took, or the last error
/// with the number of attempts made. Cancellation is never retried.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> std::result::Result<(T, u32), (Error, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err((Error::Cancelled, attempt - 1));
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err((Error::Cancelled, attempt)),
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => return Ok((value, attempt)),
            Err(Error::Cancelled) => return Err((Error::Cancelled, attempt)),
            Err(err) if attempt >= policy.max_attempts => return Err((err, attempt)),
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after failed attempt"
                );
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err((Error::Cancelled, attempt)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
