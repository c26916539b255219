//! Bounded retry with exponential backoff.
//!
//! Attempts run sequentially. Before attempt `n` (counted from 0, never
//! before the first) the loop sleeps `base_delay * 2^n`. Every wait is
//! bounded by the caller's deadline, and dropping the returned future stops
//! the loop at its current await point.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{error, warn};

use crate::domain::errors::FetchError;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay unit of the exponential backoff
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Sleep before attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Sum of the sleeps taken before the first `attempts` attempts.
    pub fn total_backoff(&self, attempts: u32) -> Duration {
        (1..attempts).fold(Duration::ZERO, |total, n| total.saturating_add(self.backoff(n)))
    }

    /// Largest attempt count, at most `attempts()`, whose backoff sleeps all
    /// end before `budget` runs out. Always at least one.
    pub fn attempts_within(&self, budget: Duration) -> u32 {
        let mut fitting = 1;
        while fitting < self.attempts() && self.total_backoff(fitting + 1) < budget {
            fitting += 1;
        }
        fitting
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// runs out of attempts or hits `deadline`.
///
/// # Arguments
/// * `label` - Name of the operation for logging purposes
/// * `policy` - Attempt bound and backoff unit
/// * `deadline` - Hard bound on the whole loop, backoff sleeps included
/// * `operation` - Produces one attempt; receives the 0-based attempt index
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    deadline: Instant,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.attempts();
    let mut last_error: Option<FetchError> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let backoff = policy.backoff(attempt);
            if Instant::now() + backoff >= deadline {
                return Err(match last_error {
                    Some(last) => {
                        error!(
                            operation = label,
                            attempts = attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %last,
                            "Backoff would exceed deadline, giving up"
                        );
                        FetchError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(last),
                        }
                    }
                    None => FetchError::DeadlineExceeded("backing off before retry"),
                });
            }
            warn!(
                operation = label,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying"
            );
            sleep_until(Instant::now() + backoff).await;
        }

        match tokio::time::timeout_at(deadline, operation(attempt)).await {
            Err(_) => return Err(FetchError::DeadlineExceeded("waiting for upstream")),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => {
                warn!(operation = label, attempt = attempt + 1, error = %e, "Attempt failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => {
            error!(operation = label, attempts, error = %last, "All attempts failed");
            Err(FetchError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            })
        }
        None => Err(FetchError::Transport(format!("{} made no attempts", label))),
    }
}
