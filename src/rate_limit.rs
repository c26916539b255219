use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::errors::FetchError;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Sustained upstream requests per second, shared by all symbols
    pub requests_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket in front of the upstream price API (burst of one).
#[derive(Clone)]
pub struct FetchRateLimiter {
    limiter: Arc<DirectLimiter>,
    period: Duration,
}

impl FetchRateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        let rate = if config.requests_per_second.is_finite() && config.requests_per_second > 0.0 {
            config.requests_per_second
        } else {
            warn!(
                requests_per_second = config.requests_per_second,
                "Invalid request rate, using default"
            );
            RateLimiterConfig::default().requests_per_second
        };

        let period = Duration::from_secs_f64(1.0 / rate);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            period,
        }
    }

    /// Minimum spacing between two requests.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for a token, giving up at `deadline`.
    ///
    /// A caller that gives up (or whose future is dropped) does not consume
    /// a token.
    pub async fn acquire(&self, deadline: Instant) -> Result<(), FetchError> {
        tokio::time::timeout_at(deadline, self.limiter.until_ready())
            .await
            .map_err(|_| FetchError::DeadlineExceeded("waiting for rate limiter"))
    }

    /// Takes a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
