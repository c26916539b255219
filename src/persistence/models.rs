//! Database Models
//!
//! Row structures as stored, and their conversions into domain entities.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use super::DatabaseError;
use crate::domain::entities::prediction::Direction;
use crate::domain::entities::tracking::{
    AccuracySummary, CalendarDay, DailyAccuracy, ExecutionLog, PredictionRecord,
};

/// prediction_tracking row
#[derive(Debug, Clone, FromRow)]
pub struct PredictionRow {
    pub id: i64,
    pub symbol: String,
    pub prediction_date: NaiveDate,
    pub predicted_price: Option<f64>,
    pub predicted_direction: Option<String>, // "up", "down" or "hold"
    pub confidence: Option<f64>,
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

impl TryFrom<PredictionRow> for PredictionRecord {
    type Error = DatabaseError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let predicted_direction = row
            .predicted_direction
            .as_deref()
            .map(str::parse::<Direction>)
            .transpose()
            .map_err(DatabaseError::InvalidRow)?;

        Ok(PredictionRecord {
            id: row.id,
            symbol: row.symbol,
            prediction_date: row.prediction_date,
            predicted_price: row.predicted_price,
            predicted_direction,
            confidence: row.confidence,
            reference_price: row.reference_price,
            actual_close: row.actual_close,
            accuracy_mape: row.accuracy_mape,
            direction_correct: row.direction_correct,
            market_was_open: row.market_was_open,
            prediction_timestamp: row.prediction_timestamp,
            actual_price_timestamp: row.actual_price_timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// daily_execution_log row
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionLogRow {
    pub id: i64,
    pub execution_date: NaiveDate,
    pub execution_type: String,
    pub status: String,
    pub total_symbols: i64,
    pub successful_predictions: i64,
    pub failed_predictions: i64,
    pub symbols_processed: String, // JSON array
    pub symbols_succeeded: String, // JSON array
    pub symbols_failed: String,    // JSON array
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn symbol_list(column: &str, json: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(json)
        .map_err(|e| DatabaseError::InvalidRow(format!("{} is not a JSON string array: {}", column, e)))
}

/// Serializes a symbol list for storage.
pub fn symbol_list_json(symbols: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(symbols).map_err(|e| DatabaseError::InvalidRow(e.to_string()))
}

impl TryFrom<ExecutionLogRow> for ExecutionLog {
    type Error = DatabaseError;

    fn try_from(row: ExecutionLogRow) -> Result<Self, Self::Error> {
        Ok(ExecutionLog {
            id: row.id,
            execution_date: row.execution_date,
            execution_type: row.execution_type.parse().map_err(DatabaseError::InvalidRow)?,
            status: row.status.parse().map_err(DatabaseError::InvalidRow)?,
            total_symbols: row.total_symbols.max(0) as usize,
            successful_predictions: row.successful_predictions.max(0) as usize,
            failed_predictions: row.failed_predictions.max(0) as usize,
            symbols_processed: symbol_list("symbols_processed", &row.symbols_processed)?,
            symbols_succeeded: symbol_list("symbols_succeeded", &row.symbols_succeeded)?,
            symbols_failed: symbol_list("symbols_failed", &row.symbols_failed)?,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// market_calendar row
#[derive(Debug, Clone, FromRow)]
pub struct CalendarRow {
    pub date: NaiveDate,
    pub is_market_open: bool,
    pub holiday_name: Option<String>,
    pub market_type: String,
}

impl From<CalendarRow> for CalendarDay {
    fn from(row: CalendarRow) -> Self {
        CalendarDay {
            date: row.date,
            is_market_open: row.is_market_open,
            holiday_name: row.holiday_name,
            market_type: row.market_type,
        }
    }
}

/// Per-symbol aggregate over prediction_tracking
#[derive(Debug, Clone, FromRow)]
pub struct AccuracySummaryRow {
    pub symbol: String,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
    pub average_accuracy_mape: Option<f64>,
    pub direction_accuracy: Option<f64>,
    pub average_confidence: Option<f64>,
    pub best_accuracy: Option<f64>,
    pub worst_accuracy: Option<f64>,
    pub last_prediction_date: Option<String>, // MAX() yields untyped text
}

pub(crate) fn parse_stored_date(value: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| DatabaseError::InvalidRow(format!("invalid date '{}': {}", s, e)))
        })
        .transpose()
}

impl TryFrom<AccuracySummaryRow> for AccuracySummary {
    type Error = DatabaseError;

    fn try_from(row: AccuracySummaryRow) -> Result<Self, Self::Error> {
        Ok(AccuracySummary {
            symbol: row.symbol,
            total_predictions: row.total_predictions,
            predictions_with_actual: row.predictions_with_actual,
            average_accuracy_mape: row.average_accuracy_mape,
            direction_accuracy: row.direction_accuracy,
            average_confidence: row.average_confidence,
            best_accuracy: row.best_accuracy,
            worst_accuracy: row.worst_accuracy,
            last_prediction_date: parse_stored_date(row.last_prediction_date)?,
        })
    }
}

/// Per-day aggregate over prediction_tracking
#[derive(Debug, Clone, FromRow)]
pub struct DailyAccuracyRow {
    pub prediction_date: String,
    pub average_accuracy_mape: Option<f64>,
    pub direction_accuracy: Option<f64>,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
}

impl TryFrom<DailyAccuracyRow> for DailyAccuracy {
    type Error = DatabaseError;

    fn try_from(row: DailyAccuracyRow) -> Result<Self, Self::Error> {
        let date = parse_stored_date(Some(row.prediction_date))?
            .ok_or_else(|| DatabaseError::InvalidRow("missing prediction date".to_string()))?;
        Ok(DailyAccuracy {
            date,
            average_accuracy_mape: row.average_accuracy_mape,
            direction_accuracy: row.direction_accuracy,
            total_predictions: row.total_predictions,
            predictions_with_actual: row.predictions_with_actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_list_round_trip_and_rejection() {
        let json = symbol_list_json(&["AAPL".to_string(), "MSFT".to_string()]).unwrap();
        assert_eq!(json, r#"["AAPL","MSFT"]"#);
        assert!(symbol_list("symbols_failed", "not json").is_err());
    }

    #[test]
    fn test_parse_stored_date() {
        assert_eq!(
            parse_stored_date(Some("2024-03-05".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(parse_stored_date(None).unwrap(), None);
        assert!(parse_stored_date(Some("03/05/2024".to_string())).is_err());
    }
}
