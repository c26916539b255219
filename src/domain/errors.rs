use thiserror::Error;

/// Input rejected before any work is attempted. Never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,

    #[error("invalid symbol format: {0} (must be 1-5 uppercase letters)")]
    InvalidSymbol(String),

    #[error("invalid price at index {index}: {value} (must be positive)")]
    NonPositivePrice { index: usize, value: f64 },

    #[error("NaN price at index {0}")]
    NanPrice(usize),

    #[error("infinite price at index {0}")]
    InfinitePrice(usize),

    #[error("insufficient data points: got {got}, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    #[error("invalid price: {0}")]
    InvalidPrice(String),
}

/// Failures of the market data fetch layer.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(#[from] ValidationError),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("API error: {code} - {description}")]
    Upstream { code: String, description: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid stock data: {0}")]
    InvalidData(String),

    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),

    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_)
                | FetchError::UpstreamStatus { .. }
                | FetchError::Upstream { .. }
                | FetchError::Parse(_)
                | FetchError::InvalidData(_)
        )
    }

    /// Transient upstream trouble that should surface as "service unavailable"
    /// rather than as a client mistake.
    pub fn is_service_unavailable(&self) -> bool {
        match self {
            FetchError::RetriesExhausted { .. } | FetchError::DeadlineExceeded(_) => true,
            other => other.is_retryable(),
        }
    }
}

/// Failures reported by (or about) the external prediction model.
#[derive(Debug, Error, Clone)]
pub enum PredictorError {
    #[error("model did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("model execution failed: {0}")]
    Execution(String),

    #[error("invalid predicted price: {0}")]
    InvalidOutput(String),

    #[error("invalid model input: {0}")]
    InvalidInput(String),
}

/// Failures while producing a single prediction.
#[derive(Debug, Error, Clone)]
pub enum PredictionError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("prediction failed: {0}")]
    Predictor(#[from] PredictorError),
}

/// Failures of the trading calendar.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to query market calendar: {0}")]
    Storage(String),

    #[error("no trading day found in the {0} days before {1}")]
    NoTradingDay(u32, chrono::NaiveDate),
}

/// Rejected execution-log status change.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid execution status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}
