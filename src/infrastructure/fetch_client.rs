//! Market data fetch client
//!
//! Wraps a [`PriceSource`] with symbol validation, a shared token-bucket
//! rate limiter, bounded retries and series validation. Every wait inside a
//! fetch is bounded by the fetch deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::errors::FetchError;
use crate::domain::repositories::PriceSource;
use crate::domain::value_objects::price_series::PriceSeries;
use crate::domain::value_objects::symbol::validate_symbol;
use crate::rate_limit::{FetchRateLimiter, RateLimiterConfig};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Period used by `fetch_latest_price`.
pub const LATEST_PRICE_PERIOD: &str = "1d";

/// Smallest chart range covering `days` calendar days, capped at two years.
pub fn period_for_days(days: u32) -> &'static str {
    match days {
        0..=7 => "7d",
        8..=30 => "1mo",
        31..=90 => "3mo",
        91..=180 => "6mo",
        181..=365 => "1y",
        _ => "2y",
    }
}

#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    pub rate_limit: RateLimiterConfig,
    pub retry: RetryPolicy,
    /// Bound on one whole fetch, retries included
    pub deadline: Duration,
    /// Canary symbol used by `health_check`
    pub health_check_symbol: String,
}

impl Default for FetchClientConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimiterConfig::default(),
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(60),
            health_check_symbol: "AAPL".to_string(),
        }
    }
}

pub struct FetchClient {
    source: Arc<dyn PriceSource>,
    limiter: FetchRateLimiter,
    config: FetchClientConfig,
}

impl FetchClient {
    pub fn new(source: Arc<dyn PriceSource>, config: FetchClientConfig) -> Self {
        let limiter = FetchRateLimiter::new(&config.rate_limit);
        Self {
            source,
            limiter,
            config,
        }
    }

    /// Daily closes for `symbol` over `period`, bounded by the configured deadline.
    pub async fn fetch(&self, symbol: &str, period: &str) -> Result<PriceSeries, FetchError> {
        self.fetch_with_deadline(symbol, period, Instant::now() + self.config.deadline)
            .await
    }

    /// Daily closes for `symbol` over `period`, giving up at `deadline`.
    ///
    /// An invalid symbol fails immediately without reaching the upstream.
    pub async fn fetch_with_deadline(
        &self,
        symbol: &str,
        period: &str,
        deadline: Instant,
    ) -> Result<PriceSeries, FetchError> {
        validate_symbol(symbol)?;

        let started = Instant::now();
        let source = &self.source;
        let limiter = &self.limiter;

        let result = retry_with_backoff("fetch_stock_data", &self.config.retry, deadline, |_| async move {
            limiter.acquire(deadline).await?;
            let closes = source.daily_closes(symbol, period).await?;
            PriceSeries::new(closes).map_err(|e| FetchError::InvalidData(e.to_string()))
        })
        .await;

        match &result {
            Ok(series) => info!(
                symbol = %symbol,
                source = source.name(),
                data_points = series.len(),
                latest_price = series.last(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Fetched stock data"
            ),
            Err(e) => error!(
                symbol = %symbol,
                source = source.name(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stock data fetch failed"
            ),
        }

        result
    }

    /// Most recent close of `symbol`.
    pub async fn fetch_latest_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let series = self.fetch(symbol, LATEST_PRICE_PERIOD).await?;
        Ok(series.last())
    }

    /// Daily closes covering at least the last `days` calendar days.
    pub async fn fetch_historical(&self, symbol: &str, days: u32) -> Result<PriceSeries, FetchError> {
        self.fetch(symbol, period_for_days(days)).await
    }

    /// Fetches the canary symbol once. Touches no cache or storage.
    pub async fn health_check(&self) -> Result<(), FetchError> {
        let symbol = &self.config.health_check_symbol;
        match self.fetch_latest_price(symbol).await {
            Ok(price) => {
                info!(symbol = %symbol, price, "Market data health check passed");
                Ok(())
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Market data health check failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ValidationError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted responses, repeating the last one.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<f64>, FetchError>>>,
        calls: AtomicU32,
        periods: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<f64>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
                periods: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn daily_closes(&self, _symbol: &str, period: &str) -> Result<Vec<f64>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.periods.lock().unwrap().push(period.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn config() -> FetchClientConfig {
        FetchClientConfig {
            rate_limit: RateLimiterConfig {
                requests_per_second: 1000.0,
            },
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
            deadline: Duration::from_secs(5),
            health_check_symbol: "AAPL".to_string(),
        }
    }

    #[tokio::test]
    async fn test_invalid_symbol_never_reaches_upstream() {
        let source = ScriptedSource::new(vec![Ok(vec![1.0])]);
        let client = FetchClient::new(source.clone(), config());

        for symbol in ["", "aapl", "TOOLONG"] {
            let err = client.fetch(symbol, "1mo").await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidSymbol(_)), "{}", symbol);
        }
        assert!(matches!(
            client.fetch("", "1mo").await.unwrap_err(),
            FetchError::InvalidSymbol(ValidationError::EmptySymbol)
        ));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Transport("reset".to_string())),
            Err(FetchError::UpstreamStatus {
                status: 502,
                body: String::new(),
            }),
            Ok(vec![100.0, 101.0]),
        ]);
        let client = FetchClient::new(source.clone(), config());

        let series = client.fetch("AAPL", "1mo").await.unwrap();
        assert_eq!(series.as_slice(), &[100.0, 101.0]);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_series_is_retried_then_exhausted() {
        let source = ScriptedSource::new(vec![Ok(vec![100.0, -1.0])]);
        let client = FetchClient::new(source.clone(), config());

        let err = client.fetch("AAPL", "1mo").await.unwrap_err();
        assert!(err.is_service_unavailable());
        match err {
            FetchError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::InvalidData(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let source = ScriptedSource::new(vec![Err(FetchError::Transport("down".to_string()))]);
        let mut cfg = config();
        cfg.retry.max_attempts = 0;
        let client = FetchClient::new(source.clone(), cfg);

        let err = client.fetch("AAPL", "1mo").await.unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_wait_bounded_by_deadline() {
        let source = ScriptedSource::new(vec![Ok(vec![1.0])]);
        let mut cfg = config();
        cfg.rate_limit.requests_per_second = 0.5;
        let client = FetchClient::new(source.clone(), cfg);

        client.fetch("AAPL", "1mo").await.unwrap();

        let started = Instant::now();
        let err = client
            .fetch_with_deadline("AAPL", "1mo", Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::DeadlineExceeded(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_price_and_health_check() {
        let source = ScriptedSource::new(vec![Ok(vec![99.0, 100.5])]);
        let client = FetchClient::new(source, config());

        assert_eq!(client.fetch_latest_price("MSFT").await.unwrap(), 100.5);
        assert!(client.health_check().await.is_ok());
    }

    #[test]
    fn test_period_for_days() {
        let cases = [
            (0, "7d"),
            (7, "7d"),
            (8, "1mo"),
            (30, "1mo"),
            (90, "3mo"),
            (91, "6mo"),
            (180, "6mo"),
            (365, "1y"),
            (366, "2y"),
        ];
        for (days, period) in cases {
            assert_eq!(period_for_days(days), period, "{} days", days);
        }
    }

    #[tokio::test]
    async fn test_fetch_historical_maps_days_to_period() {
        let source = ScriptedSource::new(vec![Ok(vec![10.0, 11.0, 12.0])]);
        let client = FetchClient::new(source.clone(), config());

        let series = client.fetch_historical("NVDA", 60).await.unwrap();
        assert_eq!(series.len(), 3);
        client.fetch_historical("NVDA", 400).await.unwrap();
        assert_eq!(*source.periods.lock().unwrap(), vec!["3mo", "2y"]);
    }

    #[tokio::test]
    async fn test_health_check_reports_failure() {
        let source = ScriptedSource::new(vec![Err(FetchError::Transport("down".to_string()))]);
        let client = FetchClient::new(source, config());
        assert!(client.health_check().await.is_err());
    }
}
