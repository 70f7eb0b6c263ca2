use std::future::Future;
use std::time::Duration;

use crate::models::CoreResult;

/// Calls `operation` up to `max_attempts` times, sleeping `delay` between
/// failed attempts. Every error is retried; the last one is returned.
/// A `max_attempts` of zero still makes one attempt.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_attempts => return Err(error),
            Err(_) => {
                tracing::debug!(attempt, max_attempts, "operation failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

/// Retry policy for calls into a backend. Unlike [`with_retry`] it gives up
/// at once on errors whose kind is not retryable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let millis = initial.as_millis() as f64 * factor.max(1.0).powi(exponent);
                let capped = max.as_millis() as f64;
                if !millis.is_finite() || millis >= capped {
                    max
                } else {
                    Duration::from_millis(millis.round() as u64)
                }
            }
        }
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() || attempt >= self.max_attempts => {
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = ?error.kind,
                        message = %error.message,
                        "retryable backend error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
