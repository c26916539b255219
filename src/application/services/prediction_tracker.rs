//! Prediction Tracker
//!
//! Runs the daily prediction batch, reconciles predictions with realized
//! closes, and answers read-only accuracy queries.
//!
//! A batch run walks `pending -> running -> {completed, failed}`. Symbols
//! are processed one after another and a failing symbol never stops the
//! rest. The prediction rows and the execution log are written separately;
//! there is no transaction spanning both.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::prediction_service::PredictionService;
use crate::application::errors::TrackingError;
use crate::domain::entities::prediction::{calculate_mape, Direction};
use crate::domain::entities::tracking::{
    AccuracySummary, ActualPriceUpdate, CreatePrediction, DailyAccuracy, DailyPredictionStatus,
    ExecutionLog, ExecutionType, PerformanceMetrics, PredictionHistoryQuery, PredictionRecord,
};
use crate::domain::errors::{CalendarError, PredictionError, ValidationError};
use crate::domain::services::TradingCalendar;
use crate::domain::value_objects::symbol::validate_symbol;
use crate::infrastructure::FetchClient;
use crate::persistence::{
    AccuracyRepository, DbPool, ExecutionLogRepository, PredictionRepository,
};

/// Roster used when a batch request names no symbols.
pub const DEFAULT_SYMBOLS: [&str; 13] = [
    "NVDA", "TSLA", "AAPL", "MSFT", "GOOGL", "AMZN", "AUR", "PLTR", "SMCI", "TSM", "MP", "SMR",
    "SPY",
];

/// Default number of rows returned by `top_performers`.
pub const DEFAULT_TOP_PERFORMERS: u32 = 10;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub symbols: Vec<String>,
    /// Upstream lookback period for batch fetches, e.g. `1mo`
    pub lookback_period: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            lookback_period: "1mo".to_string(),
        }
    }
}

/// Parameters of one batch run.
#[derive(Debug, Clone)]
pub struct DailyPredictionRequest {
    /// `None` or empty means the configured roster
    pub symbols: Option<Vec<String>>,
    /// Defaults to today (UTC)
    pub date: Option<NaiveDate>,
    /// Skip the previous-day market check
    pub force_execute: bool,
    pub execution_type: ExecutionType,
}

impl Default for DailyPredictionRequest {
    fn default() -> Self {
        Self {
            symbols: None,
            date: None,
            force_execute: false,
            execution_type: ExecutionType::Auto,
        }
    }
}

pub struct PredictionTracker {
    fetcher: Arc<FetchClient>,
    predictions: Arc<PredictionService>,
    calendar: Arc<TradingCalendar>,
    prediction_repo: PredictionRepository,
    execution_logs: ExecutionLogRepository,
    accuracy: AccuracyRepository,
    config: TrackerConfig,
}

impl PredictionTracker {
    pub fn new(
        pool: DbPool,
        calendar: Arc<TradingCalendar>,
        fetcher: Arc<FetchClient>,
        predictions: Arc<PredictionService>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            fetcher,
            predictions,
            calendar,
            prediction_repo: PredictionRepository::new(pool.clone()),
            execution_logs: ExecutionLogRepository::new(pool.clone()),
            accuracy: AccuracyRepository::new(pool),
            config,
        }
    }

    pub fn calendar(&self) -> &Arc<TradingCalendar> {
        &self.calendar
    }

    /// Runs one batch and returns its final execution log.
    ///
    /// Unless forced, the run is aborted as `failed` when the market was
    /// closed the day before the target date. Per-symbol failures are
    /// recorded in the log; only storage failures are returned as errors.
    pub async fn execute_daily_predictions(
        &self,
        request: DailyPredictionRequest,
    ) -> Result<ExecutionLog, TrackingError> {
        let started = Instant::now();
        let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
        let symbols = match request.symbols {
            Some(symbols) if !symbols.is_empty() => symbols,
            _ => self.config.symbols.clone(),
        };

        let mut log = ExecutionLog::new(date, request.execution_type, &symbols, Utc::now());
        log.start()?;
        log.id = self.execution_logs.insert(&log).await?;

        info!(
            execution_id = log.id,
            date = %date,
            symbols = symbols.len(),
            execution_type = request.execution_type.as_str(),
            "Starting daily predictions"
        );

        let previous_day = date - ChronoDuration::days(1);
        let market_was_open = match self.calendar.is_open(previous_day).await {
            Ok(open) => open,
            Err(e) if request.force_execute => {
                warn!(date = %previous_day, error = %e, "Market status unknown, forced run continues");
                false
            }
            Err(e) => {
                let message = format!("Failed to check market status: {}", e);
                return self.abort(log, message, started).await;
            }
        };

        if !market_was_open && !request.force_execute {
            let message = format!("Market was closed on {}, skipping execution", previous_day);
            return self.abort(log, message, started).await;
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for symbol in &symbols {
            match self.predict_and_record(symbol, date, market_was_open).await {
                Ok(record) => {
                    info!(
                        symbol = %symbol,
                        predicted_price = ?record.predicted_price,
                        direction = ?record.predicted_direction,
                        "Recorded prediction"
                    );
                    succeeded.push(symbol.clone());
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Failed to execute prediction");
                    failed.push(symbol.clone());
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        log.finish(succeeded, failed, duration_ms, Utc::now())?;
        self.execution_logs.update(&log).await?;

        info!(
            execution_id = log.id,
            status = %log.status,
            successful = log.successful_predictions,
            failed = log.failed_predictions,
            duration_ms,
            "Daily predictions finished"
        );

        Ok(log)
    }

    async fn abort(
        &self,
        mut log: ExecutionLog,
        message: String,
        started: Instant,
    ) -> Result<ExecutionLog, TrackingError> {
        warn!(execution_id = log.id, reason = %message, "Daily predictions aborted");
        log.abort(message, started.elapsed().as_millis() as i64, Utc::now())?;
        self.execution_logs.update(&log).await?;
        Ok(log)
    }

    async fn predict_and_record(
        &self,
        symbol: &str,
        date: NaiveDate,
        market_was_open: bool,
    ) -> Result<PredictionRecord, TrackingError> {
        let series = self
            .fetcher
            .fetch(symbol, &self.config.lookback_period)
            .await
            .map_err(PredictionError::from)?;
        let result = self.predictions.predict(symbol, &series).await?;

        self.create_prediction(&CreatePrediction {
            symbol: symbol.to_string(),
            prediction_date: date,
            predicted_price: Some(result.predicted_price),
            predicted_direction: Some(result.trading_signal.direction()),
            confidence: Some(result.confidence),
            reference_price: Some(result.current_price),
            market_was_open,
        })
        .await
    }

    /// Creates or overwrites the prediction for `(symbol, date)`. Accuracy
    /// fields of an existing row are kept.
    pub async fn create_prediction(
        &self,
        prediction: &CreatePrediction,
    ) -> Result<PredictionRecord, TrackingError> {
        validate_symbol(&prediction.symbol)?;
        for price in [prediction.predicted_price, prediction.reference_price]
            .into_iter()
            .flatten()
        {
            ensure_positive_price(price)?;
        }
        if let Some(confidence) = prediction.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(ValidationError::InvalidPrice(format!(
                    "confidence {} outside [0, 1]",
                    confidence
                ))
                .into());
            }
        }

        Ok(self.prediction_repo.upsert(prediction).await?)
    }

    pub async fn get_prediction(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<PredictionRecord>, TrackingError> {
        Ok(self.prediction_repo.get(symbol, date).await?)
    }

    /// Records the realized close of `(symbol, date)` with its MAPE and,
    /// when a previous close is known, whether the predicted direction held.
    ///
    /// The previous close is the reconciled close of the previous trading
    /// day for the same symbol, falling back to the price the prediction
    /// was made from.
    pub async fn update_actual_price(
        &self,
        symbol: &str,
        date: NaiveDate,
        actual_close: f64,
    ) -> Result<PredictionRecord, TrackingError> {
        validate_symbol(symbol)?;
        ensure_positive_price(actual_close)?;

        let not_found = || TrackingError::NotFound {
            symbol: symbol.to_string(),
            date,
        };
        let record = self
            .prediction_repo
            .get(symbol, date)
            .await?
            .ok_or_else(not_found)?;

        let accuracy_mape = record
            .predicted_price
            .map(|predicted| calculate_mape(predicted, actual_close));

        let previous_close = match self.previous_close(symbol, date).await? {
            Some(close) => Some(close),
            None => record.reference_price,
        };

        let direction_correct = match (record.predicted_direction, previous_close) {
            (Some(predicted), Some(previous)) => Some(
                Direction::from_price_change(actual_close, previous, Direction::DEFAULT_HOLD_THRESHOLD)
                    == predicted,
            ),
            _ => None,
        };

        let update = ActualPriceUpdate {
            actual_close,
            accuracy_mape,
            direction_correct,
        };
        if !self.prediction_repo.update_actual(symbol, date, &update).await? {
            return Err(not_found());
        }

        info!(
            symbol = %symbol,
            date = %date,
            actual_close,
            accuracy_mape = ?accuracy_mape,
            direction_correct = ?direction_correct,
            "Updated actual price"
        );

        self.prediction_repo
            .get(symbol, date)
            .await?
            .ok_or_else(not_found)
    }

    async fn previous_close(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>, TrackingError> {
        let previous_day = match self.calendar.previous_trading_day(date).await {
            Ok(day) => day,
            Err(CalendarError::NoTradingDay(..)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(self
            .prediction_repo
            .get(symbol, previous_day)
            .await?
            .and_then(|record| record.actual_close))
    }

    pub async fn prediction_history(
        &self,
        query: &PredictionHistoryQuery,
    ) -> Result<Vec<PredictionRecord>, TrackingError> {
        Ok(self.prediction_repo.history(query).await?)
    }

    pub async fn accuracy_summary(&self, symbol: &str) -> Result<AccuracySummary, TrackingError> {
        validate_symbol(symbol)?;
        Ok(self.accuracy.summary(symbol).await?)
    }

    pub async fn overall_performance_metrics(&self) -> Result<PerformanceMetrics, TrackingError> {
        let totals = self.accuracy.overall().await?;
        let symbol_summaries = self.accuracy.all_summaries().await?;
        let latest = self.execution_logs.latest().await?;

        Ok(PerformanceMetrics {
            total_symbols: totals.total_symbols,
            total_predictions: totals.total_predictions,
            predictions_with_actual: totals.predictions_with_actual,
            overall_accuracy_mape: totals.overall_accuracy_mape,
            overall_direction_accuracy: totals.overall_direction_accuracy,
            symbol_summaries,
            last_execution_date: latest.as_ref().map(|log| log.execution_date),
            last_execution_status: latest.as_ref().map(|log| log.status),
        })
    }

    /// Reconciled predictions in `[start, end]`. An empty `symbols` slice
    /// means every symbol.
    pub async fn accuracy_in_range(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PredictionRecord>, TrackingError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.prediction_repo.reconciled_in_range(symbols, start, end).await?)
    }

    /// Per-day accuracy over the last `days` days, today included.
    pub async fn accuracy_trends(
        &self,
        symbol: Option<&str>,
        days: u32,
    ) -> Result<Vec<DailyAccuracy>, TrackingError> {
        if let Some(symbol) = symbol {
            validate_symbol(symbol)?;
        }
        Ok(self
            .accuracy
            .daily_trends(symbol, days, Utc::now().date_naive())
            .await?)
    }

    /// Best symbols by MAPE among those with at least five reconciled
    /// predictions. A zero limit uses the default of ten.
    pub async fn top_performers(&self, limit: u32) -> Result<Vec<AccuracySummary>, TrackingError> {
        let limit = if limit == 0 { DEFAULT_TOP_PERFORMERS } else { limit };
        Ok(self.accuracy.top_performers(limit).await?)
    }

    /// Snapshot of the most recent batch run; all empty before the first.
    pub async fn daily_execution_status(&self) -> Result<DailyPredictionStatus, TrackingError> {
        let latest = self.execution_logs.latest().await.map_err(|e| {
            error!(error = %e, "Failed to read execution status");
            e
        })?;

        Ok(match latest {
            Some(log) => DailyPredictionStatus {
                last_execution_date: Some(log.execution_date),
                last_execution_status: Some(log.status),
                total_symbols: log.total_symbols,
                successful_symbols: log.successful_predictions,
                failed_symbols: log.failed_predictions,
                duration_ms: log.duration_ms,
                error_message: log.error_message,
            },
            None => DailyPredictionStatus::default(),
        })
    }
}

fn ensure_positive_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ValidationError::InvalidPrice(format!(
            "{} (must be positive and finite)",
            price
        )));
    }
    Ok(())
}
