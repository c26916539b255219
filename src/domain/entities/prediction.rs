use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading recommendation derived from a price prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingSignal {
    Buy,
    Sell,
    Hold,
}

impl TradingSignal {
    /// BUY when `predicted / current` exceeds `buy_threshold`, SELL when it
    /// falls below `sell_threshold`, HOLD otherwise.
    pub fn from_prices(
        current_price: f64,
        predicted_price: f64,
        buy_threshold: f64,
        sell_threshold: f64,
    ) -> Self {
        let ratio = predicted_price / current_price;

        if ratio > buy_threshold {
            TradingSignal::Buy
        } else if ratio < sell_threshold {
            TradingSignal::Sell
        } else {
            TradingSignal::Hold
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TradingSignal::Buy => Direction::Up,
            TradingSignal::Sell => Direction::Down,
            TradingSignal::Hold => Direction::Hold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradingSignal::Buy => "BUY",
            TradingSignal::Sell => "SELL",
            TradingSignal::Hold => "HOLD",
        }
    }
}

impl fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a price move relative to a hold threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Hold,
}

impl Direction {
    /// Default hold band used when reconciling realized moves (1%).
    pub const DEFAULT_HOLD_THRESHOLD: f64 = 0.01;

    /// Classifies the move from `previous_price` to `current_price`.
    /// A non-positive threshold falls back to the 1% default.
    pub fn from_price_change(current_price: f64, previous_price: f64, hold_threshold: f64) -> Self {
        let threshold = if hold_threshold <= 0.0 {
            Self::DEFAULT_HOLD_THRESHOLD
        } else {
            hold_threshold
        };

        let change = (current_price - previous_price) / previous_price;

        if change > threshold {
            Direction::Up
        } else if change < -threshold {
            Direction::Down
        } else {
            Direction::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Hold => "hold",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "hold" => Ok(Direction::Hold),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Outcome of one prediction, as cached and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub current_price: f64,
    pub predicted_price: f64,
    pub trading_signal: TradingSignal,
    pub confidence: f64,
    pub prediction_time: DateTime<Utc>,
    pub model_version: String,
}

/// Model family run by the external predictor. Each family has its own
/// script and a recommended history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionModel {
    #[default]
    Simple,
    Enhanced,
    Advanced,
}

impl PredictionModel {
    pub const ALL: [PredictionModel; 3] = [
        PredictionModel::Simple,
        PredictionModel::Enhanced,
        PredictionModel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionModel::Simple => "simple",
            PredictionModel::Enhanced => "enhanced",
            PredictionModel::Advanced => "advanced",
        }
    }

    /// Script run when no explicit script path is configured.
    pub fn default_script(&self) -> &'static str {
        match self {
            PredictionModel::Simple => "scripts/ml/predict.py",
            PredictionModel::Enhanced => "scripts/ml/enhanced_predict.py",
            PredictionModel::Advanced => "scripts/ml/advanced_predict.py",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PredictionModel::Simple => "Simple linear regression with basic trend analysis",
            PredictionModel::Enhanced => {
                "Enhanced prediction with technical indicators (RSI, MACD, Bollinger Bands)"
            }
            PredictionModel::Advanced => {
                "Advanced prediction using full OHLCV data with support/resistance analysis"
            }
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            PredictionModel::Simple => &[
                "Linear regression",
                "Basic trend analysis",
                "Price change limits",
                "Deterministic noise",
            ],
            PredictionModel::Enhanced => &[
                "Multiple prediction algorithms",
                "Technical indicators (SMA, EMA, RSI, MACD, Bollinger Bands)",
                "Ensemble prediction",
                "Volatility-based bounds",
                "Trend strength analysis",
            ],
            PredictionModel::Advanced => &[
                "Full OHLCV data utilization",
                "Support/resistance analysis",
                "Volume-price analysis",
                "Volatility breakout detection",
                "Multi-timeframe analysis",
                "Advanced technical indicators (ATR, Stochastic, OBV)",
                "Dynamic bounds based on ATR",
            ],
        }
    }

    /// Recommended `(min, max)` number of closes fed to the model.
    pub fn recommended_data_points(&self) -> (usize, usize) {
        match self {
            PredictionModel::Simple => (5, 15),
            PredictionModel::Enhanced => (10, 25),
            PredictionModel::Advanced => (15, 40),
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PredictionModel::Simple => 0,
            PredictionModel::Enhanced => 1,
            PredictionModel::Advanced => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PredictionModel::Enhanced,
            2 => PredictionModel::Advanced,
            _ => PredictionModel::Simple,
        }
    }
}

impl fmt::Display for PredictionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(PredictionModel::Simple),
            "enhanced" => Ok(PredictionModel::Enhanced),
            "advanced" => Ok(PredictionModel::Advanced),
            other => Err(format!(
                "unknown prediction model: {} (valid: simple, enhanced, advanced)",
                other
            )),
        }
    }
}

/// Description of the model currently answering predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub features: Vec<String>,
    pub script: Option<String>,
    pub recommended_min_data_points: Option<usize>,
    pub recommended_max_data_points: Option<usize>,
}

impl ModelInfo {
    /// Info for a model known only by its version tag.
    pub fn opaque(version: &str) -> Self {
        Self {
            name: "external".to_string(),
            version: version.to_string(),
            description: "Opaque external model".to_string(),
            features: Vec::new(),
            script: None,
            recommended_min_data_points: None,
            recommended_max_data_points: None,
        }
    }
}

/// Mean absolute percentage error of one prediction; 0 when `actual` is 0.
pub fn calculate_mape(predicted: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return 0.0;
    }
    ((predicted - actual).abs() / actual) * 100.0
}
