//! Bounded retry with exponential backoff
//!
//! Transient failures (`IndexUnavailable`, `InferenceTimeout`, `Timeout`) are
//! retried with binary exponential backoff plus jitter; everything else is
//! returned immediately. When attempts run out the last error is returned
//! unchanged so callers can still degrade on its kind.

use crate::errors::{QueryError, Result};
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts, including the first
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 100;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 2000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum attempts
    max_retries: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            enable_jitter: false,
        }
    }

    /// Execute operation with retry logic
    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    attempt += 1;

                    if attempt >= self.max_retries {
                        tracing::debug!(attempts = attempt, error = %e, "retries exhausted");
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));

        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // ±25% jitter
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total sleep across all retries (without jitter)
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (0..self.max_retries.saturating_sub(1))
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .min(self.max_delay_ms)
            })
            .sum();

        Duration::from_millis(total_ms)
    }

    /// Get max attempts
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
