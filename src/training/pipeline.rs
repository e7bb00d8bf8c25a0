//! Named candidate pipelines: min-max scaling followed by an estimator

use super::bagging::BaggingRegressor;
use super::estimator::{Estimator, FittedEstimator};
use super::linear_models::ElasticNet;
use super::models::{FittedRegressor, LinearTerms, Regressor};
use super::random_forest::RandomForestRegressor;
use super::xgboost::XGBoostRegressor;
use crate::data::MissingValuePolicy;
use crate::error::{NcvError, Result};
use crate::optimizer::ParameterValue;
use crate::preprocessing::MinMaxScaler;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pipelines known by name
pub const PIPELINE_NAMES: [&str; 4] = ["pipe_en", "pipe_en_bag", "pipe_rf", "pipe_xgb"];

/// Unfitted pipeline `[scaler → estimator]`.
///
/// Hyperparameters are addressed through the step name: `model__<param>`,
/// or `bagging__<param>` / `bagging__estimator__<param>` when the estimator
/// is a bagging ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    name: String,
    scaler: MinMaxScaler,
    estimator: Estimator,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, estimator: Estimator) -> Self {
        Self {
            name: name.into(),
            scaler: MinMaxScaler::new(),
            estimator,
        }
    }

    /// One of the predefined pipelines, seeded with `seed`
    pub fn from_name(name: &str, seed: u64) -> Result<Self> {
        let estimator = match name {
            "pipe_en" => Estimator::ElasticNet(ElasticNet::default()),
            "pipe_en_bag" => Estimator::Bagging(
                BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::default())).with_random_state(seed),
            ),
            "pipe_rf" => Estimator::RandomForest(RandomForestRegressor::default().with_random_state(seed)),
            "pipe_xgb" => Estimator::XGBoost(XGBoostRegressor::default()).reseeded(seed),
            _ => {
                return Err(NcvError::ConfigError(format!(
                    "unknown pipeline '{}', expected one of {}",
                    name,
                    PIPELINE_NAMES.join(", ")
                )))
            }
        };
        Ok(Self::new(name, estimator))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Short model-family label: the second token of the pipeline name
    /// (`pipe_en_bag` → `en`)
    pub fn family(&self) -> &str {
        self.name.split('_').nth(1).unwrap_or(&self.name)
    }

    /// Report label: the name without its `pipe_` prefix (`pipe_en_bag` →
    /// `en_bag`)
    pub fn label(&self) -> &str {
        self.name.strip_prefix("pipe_").unwrap_or(&self.name)
    }

    pub fn is_bagging(&self) -> bool {
        matches!(self.estimator, Estimator::Bagging(_))
    }

    /// Name of the step hyperparameters are routed to
    pub fn step_name(&self) -> &'static str {
        if self.is_bagging() {
            "bagging"
        } else {
            "model"
        }
    }

    /// How rows with missing feature values are treated for this candidate
    pub fn missing_value_policy(&self) -> MissingValuePolicy {
        if self.estimator.handles_missing() {
            MissingValuePolicy::Native
        } else {
            MissingValuePolicy::CompleteCases
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Write every predefined pipeline as `<dir>/<name>.json`
pub fn write_default_pipelines(dir: &Path, seed: u64) -> Result<Vec<PathBuf>> {
    PIPELINE_NAMES
        .iter()
        .map(|name| -> Result<PathBuf> {
            let path = dir.join(format!("{}.json", name));
            Pipeline::from_name(name, seed)?.save_json(&path)?;
            info!(pipeline = *name, path = %path.display(), "Wrote pipeline definition");
            Ok(path)
        })
        .collect()
}

/// Load `<dir>/<name>.json` when present, otherwise build the predefined pipeline
pub fn load_pipeline(dir: Option<&Path>, name: &str, seed: u64) -> Result<Pipeline> {
    match dir.map(|d| d.join(format!("{}.json", name))) {
        Some(path) if path.exists() => Pipeline::load_json(&path),
        _ => Pipeline::from_name(name, seed),
    }
}

impl Regressor for Pipeline {
    type Fitted = FittedPipeline;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        let step = self.step_name();
        match name.split_once("__") {
            Some((prefix, inner)) if prefix == step => self.estimator.set_param(inner, value),
            _ => Err(NcvError::ConfigError(format!(
                "hyperparameter '{}' does not address step '{}' of pipeline {}",
                name, step, self.name
            ))),
        }
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedPipeline> {
        let mut scaler = self.scaler.clone();
        let x_scaled = scaler.fit_transform(x)?;
        let estimator = self.estimator.fit(&x_scaled, y)?;
        Ok(FittedPipeline {
            name: self.name.clone(),
            scaler,
            estimator,
        })
    }

    fn handles_missing(&self) -> bool {
        self.estimator.handles_missing()
    }
}

/// Fitted pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    name: String,
    scaler: MinMaxScaler,
    estimator: FittedEstimator,
}

impl FittedPipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn estimator(&self) -> &FittedEstimator {
        &self.estimator
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl FittedRegressor for FittedPipeline {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x_scaled = self.scaler.transform(x)?;
        self.estimator.predict(&x_scaled)
    }

    /// Coefficients refer to the scaled inputs, so the design is scaled too
    fn linear_terms(&self, x: &Array2<f64>) -> Option<Result<LinearTerms>> {
        match self.scaler.transform(x) {
            Ok(x_scaled) => self.estimator.linear_terms(&x_scaled),
            Err(e) => Some(Err(e)),
        }
    }
}
