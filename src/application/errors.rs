use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::errors::{CalendarError, InvalidTransition, PredictionError, ValidationError};
use crate::persistence::DatabaseError;

/// Failures of the tracking service and the daily batch.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("prediction not found for {symbol} on {date}")]
    NotFound { symbol: String, date: NaiveDate },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("{0}")]
    Prediction(#[from] PredictionError),

    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl TrackingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackingError::NotFound { .. })
    }
}
