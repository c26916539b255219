pub mod calendar_overrides;
pub mod predictor;
pub mod price_source;

pub use calendar_overrides::{CalendarOverrides, InMemoryCalendarOverrides};
pub use predictor::Predictor;
pub use price_source::PriceSource;
