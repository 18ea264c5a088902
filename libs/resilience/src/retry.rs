//! Retry with exponential backoff
//!
//! The delay before retry `n` (0-based) is `base_delay_ms * 2^n`, capped at
//! `max_delay_ms`. No jitter is applied. Only errors whose code is
//! retryable are retried; everything else is returned from the attempt
//! that produced it.

use settings::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use types::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero behaves like one
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.base_delay_ms,
            settings.max_delay_ms,
        )
    }

    /// Attempts actually made by `execute_with_retry`
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Backoff before the retry that follows failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    pub fn execute_with_retry<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.execute_with_retry_notify(operation, |_, _, _| {})
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), calling
    /// `on_retry(retry_number, error, delay)` once before each retry sleep.
    /// `retry_number` starts at 1.
    pub fn execute_with_retry_notify<T, F, N>(&self, mut operation: F, mut on_retry: N) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        N: FnMut(u32, &Error, Duration),
    {
        let mut attempt = 0;
        loop {
            let error = match operation() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.next_delay(attempt, &error) {
                Ok(delay) => {
                    on_retry(attempt + 1, &error, delay);
                    std::thread::sleep(delay);
                }
                Err(()) => return Err(self.give_up(attempt, error)),
            }
            attempt += 1;
        }
    }

    /// Async variant; sleeps with `tokio::time::sleep` instead of blocking
    pub async fn execute_with_retry_async<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.next_delay(attempt, &error) {
                Ok(delay) => tokio::time::sleep(delay).await,
                Err(()) => return Err(self.give_up(attempt, error)),
            }
            attempt += 1;
        }
    }

    /// Delay before the next attempt, or `Err` when the loop must stop
    fn next_delay(&self, attempt: u32, error: &Error) -> std::result::Result<Duration, ()> {
        if !error.is_retryable() {
            return Err(());
        }
        if attempt + 1 >= self.attempts() {
            return Err(());
        }

        let delay = self.delay_for(attempt);
        warn!(
            attempt = attempt + 1,
            max_attempts = self.attempts(),
            delay_ms = delay.as_millis() as u64,
            code = %error.code,
            error = %error.message,
            "Operation failed, retrying"
        );
        Ok(delay)
    }

    fn give_up(&self, attempt: u32, error: Error) -> Error {
        if !error.is_retryable() {
            debug!(code = %error.code, "Non-retryable error, not retrying");
            return error;
        }
        let attempts = attempt + 1;
        warn!(attempts, error = %error.message, "Retry attempts exhausted");
        Error::retry_exhausted(attempts, &error)
    }
}
