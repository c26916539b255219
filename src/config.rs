use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{PredictionServiceConfig, TrackerConfig};
use crate::infrastructure::{FetchClientConfig, SubprocessPredictorConfig, YahooConfig};
use crate::persistence::DatabaseConfig;

/// Prediction cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),             // 5 minute TTL
            sweep_interval: Duration::from_secs(300), // sweep every 5 minutes
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub yahoo: YahooConfig,
    pub fetch: FetchClientConfig,
    pub cache: CacheConfig,
    pub prediction: PredictionServiceConfig,
    pub predictor: SubprocessPredictorConfig,
    pub database: DatabaseConfig,
    pub tracker: TrackerConfig,
}

/// Reads `key` and parses it. Missing keys keep the default silently;
/// unparsable or rejected values keep it with a warning.
fn env_value<T>(key: &str, default: T, accept: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let raw = match std::env::var(key) {
        Ok(raw) => raw,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => value,
        Ok(value) => {
            tracing::warn!("Invalid {} value: {}, using default: {}", key, value, default);
            default
        }
        Err(e) => {
            tracing::warn!("Failed to parse {} '{}': {}, using default: {}", key, raw, e, default);
            default
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default,
    }
}

/// Comma separated symbol list, uppercased. Empty entries are dropped.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        // Market data
        config.yahoo.base_url = env_string("API_BASE_URL", config.yahoo.base_url);
        config.yahoo.user_agent = env_string("API_USER_AGENT", config.yahoo.user_agent);
        config.yahoo.timeout = Duration::from_secs(env_value(
            "API_TIMEOUT_SECONDS",
            config.yahoo.timeout.as_secs(),
            |v| (1..=300).contains(v),
        ));

        config.fetch.retry.max_attempts = env_value(
            "STOCK_MAX_RETRIES",
            config.fetch.retry.max_attempts,
            |v| (1..=10).contains(v),
        );
        config.fetch.retry.base_delay = Duration::from_millis(env_value(
            "STOCK_BACKOFF_BASE_MS",
            config.fetch.retry.base_delay.as_millis() as u64,
            |v| *v <= 60_000,
        ));
        config.fetch.rate_limit.requests_per_second = env_value(
            "STOCK_REQUESTS_PER_SEC",
            config.fetch.rate_limit.requests_per_second,
            |v| v.is_finite() && *v > 0.0,
        );
        config.fetch.deadline = Duration::from_secs(env_value(
            "FETCH_DEADLINE_SECONDS",
            config.fetch.deadline.as_secs(),
            |v| *v > 0,
        ));
        let fitting = config.fetch.retry.attempts_within(config.fetch.deadline);
        if fitting < config.fetch.retry.attempts() {
            tracing::warn!(
                "STOCK_MAX_RETRIES ({}) backoff does not fit in FETCH_DEADLINE_SECONDS ({}s), lowering it to {}",
                config.fetch.retry.max_attempts,
                config.fetch.deadline.as_secs(),
                fitting
            );
            config.fetch.retry.max_attempts = fitting;
        }
        config.fetch.health_check_symbol =
            env_string("HEALTH_CHECK_SYMBOL", config.fetch.health_check_symbol);
        config.tracker.lookback_period =
            env_string("STOCK_LOOKBACK_PERIOD", config.tracker.lookback_period);

        // Cache
        config.cache.ttl = Duration::from_secs(env_value(
            "ML_PREDICTION_TTL_SECONDS",
            config.cache.ttl.as_secs(),
            |v| *v > 0,
        ));
        config.cache.sweep_interval = Duration::from_secs(env_value(
            "CACHE_SWEEP_INTERVAL_SECONDS",
            config.cache.sweep_interval.as_secs(),
            |v| *v > 0,
        ));

        // Prediction
        config.prediction.buy_threshold = env_value(
            "STOCK_BUY_THRESHOLD",
            config.prediction.buy_threshold,
            |v| *v >= 1.0,
        );
        config.prediction.sell_threshold = env_value(
            "STOCK_SELL_THRESHOLD",
            config.prediction.sell_threshold,
            |v| *v > 0.0 && *v <= 1.0,
        );
        config.prediction.min_data_points = env_value(
            "ML_MIN_DATA_POINTS",
            config.prediction.min_data_points,
            |v| *v >= 1,
        );
        config.prediction.max_data_points = env_value(
            "ML_MAX_DATA_POINTS",
            config.prediction.max_data_points,
            |v| *v >= 1,
        );
        if config.prediction.max_data_points < config.prediction.min_data_points {
            tracing::warn!(
                "ML_MAX_DATA_POINTS ({}) below ML_MIN_DATA_POINTS ({}), raising it",
                config.prediction.max_data_points,
                config.prediction.min_data_points
            );
            config.prediction.max_data_points = config.prediction.min_data_points;
        }
        config.prediction.predictor_timeout = Duration::from_secs(env_value(
            "ML_TIMEOUT_SECONDS",
            config.prediction.predictor_timeout.as_secs(),
            |v| (1..=600).contains(v),
        ));

        config.predictor.program = env_string("ML_PYTHON", config.predictor.program);
        config.predictor.model = env_value("ML_MODEL", config.predictor.model, |_| true);
        config.predictor.script = std::env::var("ML_PYTHON_SCRIPT")
            .ok()
            .map(|script| script.trim().to_string())
            .filter(|script| !script.is_empty());
        config.predictor.model_version = env_string("ML_MODEL_VERSION", config.predictor.model_version);

        // Storage
        config.database = DatabaseConfig::from_env();

        if let Ok(raw) = std::env::var("PREDICTION_SYMBOLS") {
            let symbols = parse_symbol_list(&raw);
            if symbols.is_empty() {
                tracing::warn!("PREDICTION_SYMBOLS is empty, using the default roster");
            } else {
                config.tracker.symbols = symbols;
            }
        }

        config
    }
}
