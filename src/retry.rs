//! Exponential backoff for provider calls.

use std::time::Duration;

use tracing::warn;

use crate::error::ExternalServiceError;

/// Decides whether a failed call is worth repeating.
pub type RetryPredicate = fn(&ExternalServiceError) -> bool;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Total attempts, the first call included. Zero behaves like one.
    pub max_attempts: u32,
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_attempts: 3,
            retryable: is_transient,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. `call` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut call: F) -> Result<T, ExternalServiceError>
    where
        F: FnMut(u32) -> Result<T, ExternalServiceError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && (self.retryable)(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, ?delay, error = %err, "provider call failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Rate limiting, server errors and transport failures are transient.
pub fn is_transient(err: &ExternalServiceError) -> bool {
    match err {
        ExternalServiceError::Status { status, .. } => *status == 429 || *status >= 500,
        ExternalServiceError::Request(err) => err.is_timeout() || err.is_connect(),
        _ => false,
    }
}
