use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::domain::entities::prediction::{ModelInfo, PredictionModel};
use crate::domain::errors::PredictorError;
use crate::domain::repositories::Predictor;
use crate::domain::value_objects::price_series::PriceSeries;

/// How the external model is launched.
#[derive(Debug, Clone)]
pub struct SubprocessPredictorConfig {
    /// Interpreter or executable, e.g. `python3`
    pub program: String,
    /// Model family selected at startup
    pub model: PredictionModel,
    /// Script overriding the model's default, used while `model` is selected
    pub script: Option<String>,
    /// Release tag; the model family is appended to it
    pub model_version: String,
}

impl Default for SubprocessPredictorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            model: PredictionModel::Simple,
            script: None,
            model_version: "v3.3.0".to_string(),
        }
    }
}

/// Runs the model as `program script "p1,p2,..."` and reads the predicted
/// close from the last non-empty line of stdout.
pub struct SubprocessPredictor {
    config: SubprocessPredictorConfig,
    model: AtomicU8,
}

impl SubprocessPredictor {
    pub fn new(config: SubprocessPredictorConfig) -> Self {
        let model = AtomicU8::new(config.model.to_u8());
        Self { config, model }
    }

    pub fn model(&self) -> PredictionModel {
        PredictionModel::from_u8(self.model.load(Ordering::Acquire))
    }

    /// Script run for `model`. The configured override only applies to the
    /// model it was configured with.
    pub fn script_for(&self, model: PredictionModel) -> &str {
        match &self.config.script {
            Some(script) if model == self.config.model => script.as_str(),
            _ => model.default_script(),
        }
    }

    /// Runs one prediction on a fixed series.
    pub async fn health_check(&self) -> Result<f64, PredictorError> {
        let sample = PriceSeries::new(vec![100.0, 101.0, 102.0, 103.0, 104.0])
            .map_err(|e| PredictorError::InvalidInput(e.to_string()))?;
        self.predict(&sample, Duration::from_secs(10)).await
    }
}

fn format_input(series: &PriceSeries) -> String {
    series
        .as_slice()
        .iter()
        .map(|p| format!("{:.2}", p))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_output(stdout: &str) -> Result<f64, PredictorError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| PredictorError::InvalidOutput("empty prediction output".to_string()))?;

    let predicted: f64 = line.parse().map_err(|e| {
        PredictorError::InvalidOutput(format!("failed to parse prediction output '{}': {}", line, e))
    })?;

    if !predicted.is_finite() || predicted <= 0.0 {
        return Err(PredictorError::InvalidOutput(format!("{}", predicted)));
    }

    Ok(predicted)
}

#[async_trait]
impl Predictor for SubprocessPredictor {
    fn model_version(&self) -> String {
        format!("{}-{}", self.config.model_version, self.model())
    }

    async fn predict(&self, series: &PriceSeries, timeout: Duration) -> Result<f64, PredictorError> {
        let input = format_input(series);
        let model = self.model();
        let script = self.script_for(model);
        debug!(
            program = %self.config.program,
            model = %model,
            script = %script,
            data_points = series.len(),
            "Calling prediction model"
        );

        let child = Command::new(&self.config.program)
            .arg(script)
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PredictorError::Execution(format!("failed to start model: {}", e)))?;

        // the child is killed when the timed-out future is dropped
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| PredictorError::Timeout(timeout))?
            .map_err(|e| PredictorError::Execution(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = %output.status, stderr = %stderr.trim(), "Prediction model failed");
            return Err(PredictorError::Execution(format!(
                "{}, output: {}{}",
                output.status,
                stdout.trim(),
                stderr.trim()
            )));
        }

        let predicted = parse_output(&stdout)?;
        debug!(predicted_price = predicted, "Prediction model answered");
        Ok(predicted)
    }

    fn model_info(&self) -> ModelInfo {
        let model = self.model();
        let (min, max) = model.recommended_data_points();
        ModelInfo {
            name: model.as_str().to_string(),
            version: self.model_version(),
            description: model.description().to_string(),
            features: model.features().iter().map(|f| f.to_string()).collect(),
            script: Some(self.script_for(model).to_string()),
            recommended_min_data_points: Some(min),
            recommended_max_data_points: Some(max),
        }
    }

    fn switch_model(&self, model: PredictionModel) -> Result<(), PredictorError> {
        let previous = PredictionModel::from_u8(self.model.swap(model.to_u8(), Ordering::AcqRel));
        info!(from = %previous, to = %model, script = %self.script_for(model), "Switched prediction model");
        Ok(())
    }
}
