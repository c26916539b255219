//! Multi-factor confidence scoring for price predictions.
//!
//! The score blends four independent factors, each bounded on its own:
//! magnitude of the predicted move, recent volatility, agreement with the
//! short and medium term trend, and return acceleration. With fewer than
//! three historical points only the magnitude of the move is used.

/// Bounds of the final multi-factor score.
pub const MIN_CONFIDENCE: f64 = 0.15;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Upper bound of the simple score used when history is too short.
pub const MAX_FALLBACK_CONFIDENCE: f64 = 0.90;

/// Minimum history for the multi-factor score.
pub const MIN_HISTORY: usize = 3;

/// Relative weights of the four factors. They sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub price_change: f64,
    pub volatility: f64,
    pub trend: f64,
    pub momentum: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        FactorWeights {
            price_change: 0.25,
            volatility: 0.35,
            trend: 0.25,
            momentum: 0.15,
        }
    }
}

/// Individual factor values, exposed for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    pub price_change: f64,
    pub volatility: f64,
    pub trend: f64,
    pub momentum: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
    Neutral,
}

/// Scores how much a prediction can be trusted, in `[0.15, 0.95]`.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: FactorWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: FactorWeights) -> Self {
        ConfidenceScorer { weights }
    }

    /// Confidence of moving from `current_price` to `predicted_price`
    /// given the chronological `history` of closes.
    pub fn score(&self, current_price: f64, predicted_price: f64, history: &[f64]) -> f64 {
        if history.len() < MIN_HISTORY {
            return simple_confidence(current_price, predicted_price);
        }
        self.breakdown(current_price, predicted_price, history).confidence
    }

    /// Same as [`score`](Self::score) but keeps the per-factor values.
    /// Always uses the multi-factor blend.
    pub fn breakdown(
        &self,
        current_price: f64,
        predicted_price: f64,
        history: &[f64],
    ) -> ConfidenceBreakdown {
        let price_change = price_change_factor(current_price, predicted_price);
        let volatility = volatility_factor(history);
        let trend = trend_alignment_factor(history, current_price, predicted_price);
        let momentum = momentum_factor(history, current_price, predicted_price);

        let blended = price_change * self.weights.price_change
            + volatility * self.weights.volatility
            + trend * self.weights.trend
            + momentum * self.weights.momentum;

        ConfidenceBreakdown {
            price_change,
            volatility,
            trend,
            momentum,
            confidence: bounded(blended, MIN_CONFIDENCE, MAX_CONFIDENCE),
        }
    }
}

/// Two-adjustment score used when history is shorter than three points.
pub fn simple_confidence(current_price: f64, predicted_price: f64) -> f64 {
    let change = relative_change(current_price, predicted_price);
    let mut confidence = (-change * 7.0).exp();

    if change < 0.003 {
        confidence *= 0.85;
    }
    if (0.01..=0.03).contains(&change) {
        confidence *= 1.1;
    }
    if change > 0.10 {
        confidence *= 0.6;
    }

    bounded(confidence, MIN_CONFIDENCE, MAX_FALLBACK_CONFIDENCE)
}

fn price_change_factor(current_price: f64, predicted_price: f64) -> f64 {
    let change = relative_change(current_price, predicted_price);
    let mut factor = (-change * 6.0).exp();

    if (0.005..=0.04).contains(&change) {
        factor *= 1.15;
    }
    if change < 0.002 {
        factor *= 0.75;
    }
    if change > 0.08 {
        factor *= 0.5;
    }

    bounded(factor, 0.1, 0.95)
}

fn volatility_factor(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.5;
    }

    let returns = simple_returns(last_n(prices, 10));
    let sigma = sample_std_dev(&returns);
    let mut factor = (-sigma * 12.0).exp();

    if sigma < 0.005 {
        factor *= 0.9;
    } else if sigma > 0.08 {
        factor *= 0.6;
    }

    bounded(factor, 0.1, 0.95)
}

fn trend_alignment_factor(prices: &[f64], current_price: f64, predicted_price: f64) -> f64 {
    if prices.len() < 3 {
        return 0.5;
    }

    let short_term = short_term_trend(prices);
    let medium_term = medium_term_trend(prices);
    let predicted = prediction_direction(current_price, predicted_price);

    let mut alignment = alignment(short_term, predicted) * 0.6 + alignment(medium_term, predicted) * 0.4;

    if short_term == medium_term && short_term != Trend::Neutral {
        alignment *= 1.1;
    }

    bounded(alignment, 0.2, 0.9)
}

fn momentum_factor(prices: &[f64], current_price: f64, predicted_price: f64) -> f64 {
    if prices.len() < 4 {
        return 0.5;
    }

    let momentum = acceleration(last_n(prices, 6));
    let predicted = prediction_direction(current_price, predicted_price);

    if (momentum > 0.001 && predicted == Trend::Up) || (momentum < -0.001 && predicted == Trend::Down) {
        0.8
    } else if momentum.abs() < 0.001 {
        0.5
    } else {
        0.3
    }
}

/// Majority of >0.1% moves over the last four points.
fn short_term_trend(prices: &[f64]) -> Trend {
    if prices.len() < 3 {
        return Trend::Neutral;
    }

    let recent = last_n(prices, 4);
    let (mut ups, mut downs) = (0usize, 0usize);
    for pair in recent.windows(2) {
        if pair[1] > pair[0] * 1.001 {
            ups += 1;
        } else if pair[1] < pair[0] * 0.999 {
            downs += 1;
        }
    }

    match ups.cmp(&downs) {
        std::cmp::Ordering::Greater => Trend::Up,
        std::cmp::Ordering::Less => Trend::Down,
        std::cmp::Ordering::Equal => Trend::Neutral,
    }
}

/// Sign of the least-squares slope over the last eight points,
/// normalized by their mean.
fn medium_term_trend(prices: &[f64]) -> Trend {
    if prices.len() < 5 {
        return Trend::Neutral;
    }

    let recent = last_n(prices, 8);
    let n = recent.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &price) in recent.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += price;
        sum_xy += x * price;
        sum_x2 += x * x;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
    let normalized = slope / (sum_y / n);

    if normalized > 0.002 {
        Trend::Up
    } else if normalized < -0.002 {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

fn prediction_direction(current_price: f64, predicted_price: f64) -> Trend {
    let change = (predicted_price - current_price) / current_price;
    if change > 0.003 {
        Trend::Up
    } else if change < -0.003 {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

fn alignment(trend: Trend, predicted: Trend) -> f64 {
    if trend == predicted && trend != Trend::Neutral {
        0.85
    } else if trend == Trend::Neutral || predicted == Trend::Neutral {
        0.5
    } else {
        0.25
    }
}

/// Mean second difference of simple returns.
fn acceleration(prices: &[f64]) -> f64 {
    if prices.len() < 3 {
        return 0.0;
    }

    let returns = simple_returns(prices);
    let accelerations: Vec<f64> = returns.windows(2).map(|w| w[1] - w[0]).collect();
    if accelerations.is_empty() {
        return 0.0;
    }

    accelerations.iter().sum::<f64>() / accelerations.len() as f64
}

fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn relative_change(current_price: f64, predicted_price: f64) -> f64 {
    (predicted_price - current_price).abs() / current_price
}

fn last_n(prices: &[f64], n: usize) -> &[f64] {
    &prices[prices.len().saturating_sub(n)..]
}

/// Clamp that sends NaN to the lower bound.
fn bounded(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_fallback_used_for_short_history() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(100.0, 102.0, &[99.0, 100.0]);
        assert!(approx(score, simple_confidence(100.0, 102.0)));
    }

    #[test]
    fn test_simple_confidence_adjustments() {
        // 2% move: exp(-0.14) * 1.1, above the ceiling
        assert_eq!(simple_confidence(100.0, 102.0), MAX_FALLBACK_CONFIDENCE);
        // 5% move: no band adjustment
        assert!(approx(simple_confidence(100.0, 105.0), (-0.35f64).exp()));
        // 0.1% move: exp(-0.007) * 0.85
        assert!(approx(simple_confidence(100.0, 100.1), (-0.007f64).exp() * 0.85));
        // 50% move is clamped to the floor
        assert_eq!(simple_confidence(100.0, 150.0), MIN_CONFIDENCE);
        // never above the fallback ceiling
        assert!(simple_confidence(100.0, 101.5) <= MAX_FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_price_change_factor_bands() {
        // 2% move gets the moderate-change boost
        assert!(approx(price_change_factor(100.0, 102.0), ((-0.12f64).exp() * 1.15).min(0.95)));
        // tiny move penalized as noise
        assert!(approx(price_change_factor(100.0, 100.1), (-0.006f64).exp() * 0.75));
        // extreme move is penalized and floored
        assert_eq!(price_change_factor(100.0, 200.0), 0.1);
    }

    #[test]
    fn test_volatility_factor_prefers_calm_series() {
        let calm = [100.0, 100.8, 101.5, 101.0, 102.0, 102.6];
        let wild = [100.0, 120.0, 90.0, 115.0, 85.0, 110.0];
        assert!(volatility_factor(&calm) > volatility_factor(&wild));
        assert_eq!(volatility_factor(&[100.0]), 0.5);
    }

    #[test]
    fn test_volatility_factor_flat_series_is_slightly_penalized() {
        let flat = [100.0; 6];
        // sigma == 0: exp(0) * 0.9
        assert!(approx(volatility_factor(&flat), 0.9));
    }

    #[test]
    fn test_trend_classification() {
        let rising = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let falling = [105.0, 104.0, 103.0, 102.0, 101.0, 100.0];
        assert_eq!(short_term_trend(&rising), Trend::Up);
        assert_eq!(medium_term_trend(&rising), Trend::Up);
        assert_eq!(short_term_trend(&falling), Trend::Down);
        assert_eq!(medium_term_trend(&falling), Trend::Down);
        assert_eq!(medium_term_trend(&[100.0, 101.0, 102.0]), Trend::Neutral);
    }

    #[test]
    fn test_trend_alignment_rewards_agreement() {
        let rising = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let with_trend = trend_alignment_factor(&rising, 105.0, 107.0);
        let against_trend = trend_alignment_factor(&rising, 105.0, 103.0);
        // both trends up and prediction up: 0.85 * 1.1, capped at 0.9
        assert!(approx(with_trend, 0.9));
        // both trends up and prediction down: 0.25 * 1.1
        assert!(approx(against_trend, 0.275));
    }

    #[test]
    fn test_momentum_factor() {
        // accelerating gains
        let accelerating = [100.0, 100.5, 101.5, 103.0, 105.0, 107.5];
        assert_eq!(momentum_factor(&accelerating, 107.5, 110.0), 0.8);
        assert_eq!(momentum_factor(&accelerating, 107.5, 105.0), 0.3);
        // constant moves have no acceleration
        assert_eq!(momentum_factor(&[100.0; 6], 100.0, 102.0), 0.5);
        assert_eq!(momentum_factor(&[100.0, 101.0, 102.0], 102.0, 103.0), 0.5);
    }

    #[test]
    fn test_score_within_bounds_and_weighted() {
        let scorer = ConfidenceScorer::default();
        let history = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let breakdown = scorer.breakdown(105.0, 107.0, &history);
        let expected = breakdown.price_change * 0.25
            + breakdown.volatility * 0.35
            + breakdown.trend * 0.25
            + breakdown.momentum * 0.15;
        assert!(approx(breakdown.confidence, expected.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)));
        assert_eq!(scorer.score(105.0, 107.0, &history), breakdown.confidence);
    }

    #[test]
    fn test_degenerate_inputs_stay_in_range() {
        let scorer = ConfidenceScorer::default();
        for (current, predicted) in [(0.0, 1.0), (f64::NAN, 1.0), (1.0, f64::NAN), (1.0, f64::INFINITY)] {
            let score = scorer.score(current, predicted, &[1.0, 1.0, 1.0, 1.0]);
            assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&score), "{} -> {}", current, score);
            let fallback = scorer.score(current, predicted, &[]);
            assert!((MIN_CONFIDENCE..=MAX_FALLBACK_CONFIDENCE).contains(&fallback));
        }
    }
}
