pub mod prediction_service;
pub mod prediction_tracker;

pub use prediction_service::{PredictionService, PredictionServiceConfig};
pub use prediction_tracker::{DailyPredictionRequest, PredictionTracker, TrackerConfig, DEFAULT_SYMBOLS};
