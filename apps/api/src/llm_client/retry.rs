//! Retry policy for provider calls.
//!
//! - rate limits and provider 5xx: exponential backoff, up to `max_attempts` total attempts
//! - timeouts and transport failures: retried `timeout_retries` times (default once)
//! - everything else: surfaced on the first failure

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ErrorKind, LlmError, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts for rate-limited / unavailable calls, first attempt included.
    pub max_attempts: u32,
    /// Extra attempts after a timeout or transport failure.
    pub timeout_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_retries: 1,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Whether a call that just failed on attempt number `attempt` (1-based) may go again.
    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        let budget = match error.kind() {
            ErrorKind::RateLimit | ErrorKind::Unavailable => self.max_attempts,
            ErrorKind::Timeout | ErrorKind::Network => {
                (1 + self.timeout_retries).min(self.max_attempts.max(1))
            }
            _ => return false,
        };
        attempt < budget
    }

    /// Delay before attempt `attempt + 1`: 1s, 2s, 4s... with the default policy.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget runs out.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, provider: ProviderId, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        provider = %provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        warn!(
                            provider = %provider,
                            attempts = attempt,
                            error = %err,
                            "LLM call failed, retry budget exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}
