//! Prediction tracking entities
//!
//! Records persisted by the daily batch and the reconciliation step, the
//! execution log state machine, calendar overrides and the read-only
//! accuracy projections built from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::prediction::Direction;
use crate::domain::errors::InvalidTransition;

/// Market type recorded on calendar overrides.
pub const US_MARKET: &str = "US";

/// A tracked prediction for one (symbol, date) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub symbol: String,
    pub prediction_date: NaiveDate,
    pub predicted_price: Option<f64>,
    pub predicted_direction: Option<Direction>,
    pub confidence: Option<f64>,
    /// Latest close the prediction was made from.
    pub reference_price: Option<f64>,
    pub actual_close: Option<f64>,
    pub accuracy_mape: Option<f64>,
    pub direction_correct: Option<bool>,
    pub market_was_open: bool,
    pub prediction_timestamp: DateTime<Utc>,
    pub actual_price_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn is_reconciled(&self) -> bool {
        self.actual_close.is_some()
    }
}

/// Input for the prediction upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePrediction {
    pub symbol: String,
    pub prediction_date: NaiveDate,
    pub predicted_price: Option<f64>,
    pub predicted_direction: Option<Direction>,
    pub confidence: Option<f64>,
    pub reference_price: Option<f64>,
    pub market_was_open: bool,
}

/// Accuracy fields written once the realized close is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ActualPriceUpdate {
    pub actual_close: f64,
    pub accuracy_mape: Option<f64>,
    pub direction_correct: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    Auto,
    Manual,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionType::Auto => "auto",
            ExecutionType::Manual => "manual",
        }
    }
}

impl FromStr for ExecutionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ExecutionType::Auto),
            "manual" => Ok(ExecutionType::Manual),
            other => Err(format!("unknown execution type: {}", other)),
        }
    }
}

/// Lifecycle of a batch run: `Pending -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (ExecutionStatus::Pending, ExecutionStatus::Running)
                | (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// Summary of one daily batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: i64,
    pub execution_date: NaiveDate,
    pub execution_type: ExecutionType,
    pub status: ExecutionStatus,
    pub total_symbols: usize,
    pub successful_predictions: usize,
    pub failed_predictions: usize,
    pub symbols_processed: Vec<String>,
    pub symbols_succeeded: Vec<String>,
    pub symbols_failed: Vec<String>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionLog {
    /// New log in `Pending` for the given symbol set.
    pub fn new(
        execution_date: NaiveDate,
        execution_type: ExecutionType,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            execution_date,
            execution_type,
            status: ExecutionStatus::Pending,
            total_symbols: symbols.len(),
            successful_predictions: 0,
            failed_predictions: 0,
            symbols_processed: symbols.to_vec(),
            symbols_succeeded: Vec::new(),
            symbols_failed: Vec::new(),
            duration_ms: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// `Pending -> Running`.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Running)
    }

    /// Terminal transition after every symbol was attempted.
    ///
    /// Fails only when every symbol failed; a partially failed batch still
    /// completes, with an advisory message naming the failed symbols.
    pub fn finish(
        &mut self,
        succeeded: Vec<String>,
        failed: Vec<String>,
        duration_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let (next, message) = if failed.is_empty() {
            (ExecutionStatus::Completed, None)
        } else if succeeded.is_empty() {
            (
                ExecutionStatus::Failed,
                Some(format!("All predictions failed. Failed symbols: {:?}", failed)),
            )
        } else {
            (
                ExecutionStatus::Completed,
                Some(format!("Partial success. Failed symbols: {:?}", failed)),
            )
        };

        self.transition(next)?;
        self.successful_predictions = succeeded.len();
        self.failed_predictions = failed.len();
        self.symbols_succeeded = succeeded;
        self.symbols_failed = failed;
        self.error_message = message;
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Terminal failure before any symbol was processed.
    pub fn abort(
        &mut self,
        message: String,
        duration_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Failed)?;
        self.error_message = Some(message);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(now);
        Ok(())
    }
}

/// Calendar override row. Only exceptions are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_market_open: bool,
    pub holiday_name: Option<String>,
    pub market_type: String,
}

impl CalendarDay {
    pub fn holiday(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            is_market_open: false,
            holiday_name: Some(name.into()),
            market_type: US_MARKET.to_string(),
        }
    }
}

/// Accuracy statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub symbol: String,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
    pub average_accuracy_mape: Option<f64>,
    /// Percentage of reconciled predictions whose direction was right.
    pub direction_accuracy: Option<f64>,
    pub average_confidence: Option<f64>,
    pub best_accuracy: Option<f64>,
    pub worst_accuracy: Option<f64>,
    pub last_prediction_date: Option<NaiveDate>,
}

/// Accuracy statistics across all symbols.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_symbols: i64,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
    pub overall_accuracy_mape: Option<f64>,
    pub overall_direction_accuracy: Option<f64>,
    pub symbol_summaries: Vec<AccuracySummary>,
    pub last_execution_date: Option<NaiveDate>,
    pub last_execution_status: Option<ExecutionStatus>,
}

/// One point of an accuracy trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAccuracy {
    pub date: NaiveDate,
    pub average_accuracy_mape: Option<f64>,
    pub direction_accuracy: Option<f64>,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
}

/// Snapshot of the most recent batch run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyPredictionStatus {
    pub last_execution_date: Option<NaiveDate>,
    pub last_execution_status: Option<ExecutionStatus>,
    pub total_symbols: usize,
    pub successful_symbols: usize,
    pub failed_symbols: usize,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Date,
    Accuracy,
    Confidence,
}

impl OrderBy {
    /// Column the ordering maps to. Closed set, safe to splice into SQL.
    pub fn column(&self) -> &'static str {
        match self {
            OrderBy::Date => "prediction_date",
            OrderBy::Accuracy => "accuracy_mape",
            OrderBy::Confidence => "confidence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Filters for the prediction history listing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionHistoryQuery {
    pub symbol: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// 0 means no limit.
    pub limit: u32,
    pub offset: u32,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_status_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn test_log_full_success() {
        let mut log = ExecutionLog::new(date(), ExecutionType::Manual, &symbols(&["A", "B"]), Utc::now());
        assert_eq!(log.status, ExecutionStatus::Pending);
        log.start().unwrap();
        log.finish(symbols(&["A", "B"]), vec![], 12, Utc::now()).unwrap();

        assert_eq!(log.status, ExecutionStatus::Completed);
        assert_eq!(log.successful_predictions, 2);
        assert_eq!(log.failed_predictions, 0);
        assert!(log.error_message.is_none());
        assert_eq!(log.duration_ms, Some(12));
        assert!(log.completed_at.is_some());
    }

    #[test]
    fn test_log_partial_success_is_completed_with_advisory() {
        let mut log = ExecutionLog::new(date(), ExecutionType::Auto, &symbols(&["A", "B", "C"]), Utc::now());
        log.start().unwrap();
        log.finish(symbols(&["A", "C"]), symbols(&["B"]), 5, Utc::now()).unwrap();

        assert_eq!(log.status, ExecutionStatus::Completed);
        assert_eq!(log.symbols_failed, vec!["B".to_string()]);
        let message = log.error_message.unwrap();
        assert!(message.starts_with("Partial success"));
        assert!(message.contains("\"B\""));
    }

    #[test]
    fn test_log_total_failure() {
        let mut log = ExecutionLog::new(date(), ExecutionType::Auto, &symbols(&["A"]), Utc::now());
        log.start().unwrap();
        log.finish(vec![], symbols(&["A"]), 5, Utc::now()).unwrap();

        assert_eq!(log.status, ExecutionStatus::Failed);
        assert!(log.error_message.unwrap().starts_with("All predictions failed"));
    }

    #[test]
    fn test_log_cannot_finish_twice_or_before_start() {
        let mut log = ExecutionLog::new(date(), ExecutionType::Auto, &symbols(&["A"]), Utc::now());
        assert!(log.finish(symbols(&["A"]), vec![], 1, Utc::now()).is_err());

        log.start().unwrap();
        log.abort("market closed".to_string(), 1, Utc::now()).unwrap();
        assert_eq!(log.status, ExecutionStatus::Failed);

        let err = log.finish(symbols(&["A"]), vec![], 1, Utc::now()).unwrap_err();
        assert_eq!(err.from, "failed");
        assert_eq!(err.to, "completed");
    }

    #[test]
    fn test_order_by_columns() {
        assert_eq!(OrderBy::default().column(), "prediction_date");
        assert_eq!(OrderBy::Accuracy.column(), "accuracy_mape");
        assert_eq!(OrderDir::default().keyword(), "DESC");
    }
}
