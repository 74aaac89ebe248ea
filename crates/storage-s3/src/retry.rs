//! Retry with full jittered exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use deltaglider_core::StoreError;
use deltaglider_common::DEFAULT_RETRY_ATTEMPTS;

/// Backoff settings for transient store errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,
    /// Initial backoff delay.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based): a uniformly random delay
    /// in `0..=min(max, initial * 2^(attempt-1))`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp: u32 = attempt.saturating_sub(1).min(16);
        let cap: u128 = self
            .initial_backoff
            .as_millis()
            .saturating_mul(1u128 << exp)
            .min(self.max_backoff.as_millis());
        let jittered: u64 = rand::thread_rng().gen_range(0..=cap as u64);
        Duration::from_millis(jittered)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts
    /// are exhausted. Only `StoreError::Transient` is retried.
    pub async fn run<T, F, Fut>(&self, op_name: &str, operation: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut last: Option<StoreError> = None;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay: Duration = self.backoff(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last = Some(err);
                }
                Err(err) => {
                    // Stamp the attempt count on transient exhaustion.
                    if let StoreError::Transient { message, .. } = err {
                        return Err(StoreError::Transient {
                            message,
                            attempts: attempt,
                        });
                    }
                    return Err(err);
                }
            }
        }

        Err(match last {
            Some(StoreError::Transient { message, .. }) => StoreError::Transient {
                message,
                attempts: self.max_attempts,
            },
            Some(err) => err,
            None => StoreError::Transient {
                message: format!("{op_name}: retries exhausted"),
                attempts: self.max_attempts,
            },
        })
    }
}
