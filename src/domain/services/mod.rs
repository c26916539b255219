pub mod confidence;
pub mod prediction_cache;
pub mod trading_calendar;

pub use confidence::ConfidenceScorer;
pub use prediction_cache::{CacheStats, CacheSweeper, PredictionCache};
pub use trading_calendar::TradingCalendar;
