use serde::Serialize;

use crate::domain::errors::ValidationError;

/// Chronological daily closing prices for one symbol.
///
/// Every value is positive and finite; the series is never empty and cannot
/// be mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries(Vec<f64>);

impl PriceSeries {
    pub fn new(prices: Vec<f64>) -> Result<Self, ValidationError> {
        validate_prices(&prices, 1)?;
        Ok(PriceSeries(prices))
    }

    /// Most recent close.
    pub fn last(&self) -> f64 {
        // non-empty by construction
        self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// The last `n` closes (or all of them when shorter).
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.0.len().saturating_sub(n.max(1));
        PriceSeries(self.0[start..].to_vec())
    }
}

impl AsRef<[f64]> for PriceSeries {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Rejects short series and any non-positive, NaN or infinite close.
pub fn validate_prices(prices: &[f64], min_len: usize) -> Result<(), ValidationError> {
    let need = min_len.max(1);
    if prices.len() < need {
        return Err(ValidationError::InsufficientData {
            got: prices.len(),
            need,
        });
    }

    for (index, &value) in prices.iter().enumerate() {
        if value.is_nan() {
            return Err(ValidationError::NanPrice(index));
        }
        if value.is_infinite() {
            return Err(ValidationError::InfinitePrice(index));
        }
        if value <= 0.0 {
            return Err(ValidationError::NonPositivePrice { index, value });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_accepts_positive_prices() {
        let series = PriceSeries::new(vec![100.0, 101.5, 99.25]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.last(), 99.25);
    }

    #[test]
    fn test_series_rejects_empty() {
        assert_eq!(
            PriceSeries::new(vec![]),
            Err(ValidationError::InsufficientData { got: 0, need: 1 })
        );
    }

    #[test]
    fn test_series_rejects_bad_values() {
        assert!(matches!(
            PriceSeries::new(vec![1.0, 0.0]),
            Err(ValidationError::NonPositivePrice { index: 1, .. })
        ));
        assert!(matches!(
            PriceSeries::new(vec![-3.0]),
            Err(ValidationError::NonPositivePrice { index: 0, .. })
        ));
        assert_eq!(
            PriceSeries::new(vec![1.0, f64::NAN]),
            Err(ValidationError::NanPrice(1))
        );
        assert_eq!(
            PriceSeries::new(vec![f64::INFINITY]),
            Err(ValidationError::InfinitePrice(0))
        );
    }

    #[test]
    fn test_validate_prices_min_length() {
        assert!(validate_prices(&[1.0, 2.0, 3.0, 4.0, 5.0], 5).is_ok());
        assert_eq!(
            validate_prices(&[1.0, 2.0], 5),
            Err(ValidationError::InsufficientData { got: 2, need: 5 })
        );
    }

    #[test]
    fn test_tail() {
        let series = PriceSeries::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(series.tail(2).as_slice(), &[3.0, 4.0]);
        assert_eq!(series.tail(10).as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
