//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use super::LlmError;

/// Retry schedule for transient LLM failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, waiting 1s then 2s (capped at 4s).
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(4),
        }
    }
}

/// What happened on one attempt.
#[derive(Debug)]
pub struct AttemptOutcome<'a> {
    pub attempt: u32,
    pub max_attempts: u32,
    /// `None` on success
    pub error: Option<&'a LlmError>,
    /// Delay before the next attempt, if one will be made
    pub retry_in: Option<Duration>,
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// `max_attempts` attempts with no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        let ms = ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(ms as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or attempts run out. `observe` sees every attempt.
    pub async fn run<T, F, Fut, O>(&self, mut operation: F, mut observe: O) -> Result<T, LlmError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
        O: FnMut(&AttemptOutcome<'_>),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    observe(&AttemptOutcome { attempt, max_attempts, error: None, retry_in: None });
                    if attempt > 1 {
                        tracing::debug!(attempt, "LLM call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retry = error.is_transient() && attempt < max_attempts;
                    let retry_in = retry.then(|| self.delay_for(attempt));
                    observe(&AttemptOutcome { attempt, max_attempts, error: Some(&error), retry_in });
                    let Some(delay) = retry_in else {
                        if error.is_transient() {
                            tracing::warn!(attempt, error = %error, "LLM call failed, attempts exhausted");
                        }
                        return Err(error);
                    };
                    tracing::warn!(attempt, max_attempts, ?delay, error = %error, "LLM call failed, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
