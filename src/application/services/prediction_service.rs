//! Prediction Service
//!
//! Turns a price series into a [`PredictionResult`]: cache lookup, model
//! call bounded by a timeout, output check, signal, confidence and cache
//! write-through.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::entities::prediction::{ModelInfo, PredictionModel, PredictionResult, TradingSignal};
use crate::domain::errors::{PredictionError, PredictorError};
use crate::domain::repositories::Predictor;
use crate::domain::services::confidence::ConfidenceScorer;
use crate::domain::services::prediction_cache::PredictionCache;
use crate::domain::value_objects::price_series::{validate_prices, PriceSeries};
use crate::domain::value_objects::symbol::validate_symbol;

#[derive(Debug, Clone)]
pub struct PredictionServiceConfig {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    /// Shortest series the model accepts
    pub min_data_points: usize,
    /// Only the most recent closes are sent to the model
    pub max_data_points: usize,
    pub predictor_timeout: Duration,
}

impl Default for PredictionServiceConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 1.01,
            sell_threshold: 0.99,
            min_data_points: 5,
            max_data_points: 30,
            predictor_timeout: Duration::from_secs(30),
        }
    }
}

pub struct PredictionService {
    predictor: Arc<dyn Predictor>,
    cache: Arc<PredictionCache>,
    scorer: ConfidenceScorer,
    config: PredictionServiceConfig,
}

impl PredictionService {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        cache: Arc<PredictionCache>,
        config: PredictionServiceConfig,
    ) -> Self {
        Self {
            predictor,
            cache,
            scorer: ConfidenceScorer::default(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<PredictionCache> {
        &self.cache
    }

    pub fn model_version(&self) -> String {
        self.predictor.model_version()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.predictor.model_info()
    }

    /// Selects another model family. Cached results belong to the previous
    /// model and are dropped.
    pub async fn switch_model(&self, model: PredictionModel) -> Result<ModelInfo, PredictionError> {
        self.predictor.switch_model(model)?;
        self.cache.clear().await;

        let info = self.predictor.model_info();
        if let (Some(min), Some(max)) = (info.recommended_min_data_points, info.recommended_max_data_points) {
            if self.config.max_data_points < min || self.config.min_data_points > max {
                warn!(
                    model = %model,
                    recommended_min = min,
                    recommended_max = max,
                    min_data_points = self.config.min_data_points,
                    max_data_points = self.config.max_data_points,
                    "Configured data window is outside the model's recommended range"
                );
            }
        }
        Ok(info)
    }

    pub async fn predict(
        &self,
        symbol: &str,
        series: &PriceSeries,
    ) -> Result<PredictionResult, PredictionError> {
        let start = Instant::now();
        validate_symbol(symbol)?;
        validate_prices(series.as_slice(), self.config.min_data_points)?;

        let window = series.tail(self.config.max_data_points);
        if let Some(cached) = self.cache.get(symbol, window.as_slice()).await {
            debug!(symbol = %symbol, "Returning cached prediction");
            return Ok(cached);
        }

        let timeout = self.config.predictor_timeout;
        let predicted_price = tokio::time::timeout(timeout, self.predictor.predict(&window, timeout))
            .await
            .map_err(|_| PredictorError::Timeout(timeout))?
            .map_err(|e| {
                warn!(symbol = %symbol, error = %e, "Model call failed");
                e
            })?;

        if !predicted_price.is_finite() || predicted_price <= 0.0 {
            return Err(PredictorError::InvalidOutput(predicted_price.to_string()).into());
        }

        let current_price = window.last();
        let trading_signal = TradingSignal::from_prices(
            current_price,
            predicted_price,
            self.config.buy_threshold,
            self.config.sell_threshold,
        );
        let confidence = self
            .scorer
            .score(current_price, predicted_price, window.as_slice());

        let result = PredictionResult {
            symbol: symbol.to_string(),
            current_price,
            predicted_price,
            trading_signal,
            confidence,
            prediction_time: Utc::now(),
            model_version: self.predictor.model_version(),
        };

        self.cache.set(symbol, window.as_slice(), result.clone()).await;

        info!(
            symbol = %symbol,
            current_price,
            predicted_price,
            signal = %trading_signal,
            confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            "Prediction completed"
        );

        Ok(result)
    }
}
