//! Predictor Trait
//!
//! The price model is opaque to the pipeline: it receives a validated
//! series and returns the predicted next close.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::entities::prediction::{ModelInfo, PredictionModel};
use crate::domain::errors::PredictorError;
use crate::domain::value_objects::price_series::PriceSeries;

#[async_trait]
pub trait Predictor: Send + Sync {
    /// Version tag recorded on every prediction.
    fn model_version(&self) -> String;

    /// Predicted next close for `series`, answered within `timeout`.
    ///
    /// Implementations may return any finite value; the caller rejects
    /// non-positive predictions.
    async fn predict(&self, series: &PriceSeries, timeout: Duration) -> Result<f64, PredictorError>;

    fn model_info(&self) -> ModelInfo {
        ModelInfo::opaque(&self.model_version())
    }

    /// Selects another model family for subsequent predictions.
    fn switch_model(&self, model: PredictionModel) -> Result<(), PredictorError> {
        Err(PredictorError::InvalidInput(format!(
            "model {} is not available from {}",
            model,
            self.model_version()
        )))
    }
}
