//! Scoring metrics registry
//!
//! Error and agreement metrics usable directly (`Metric::compute`) and as
//! cross-validation scorers (`Metric::score`). Scorers follow the
//! "greater is better" convention: error metrics (MAE, RMSE, MBE, SMAPE) are
//! negated, R² is returned as is.

use crate::error::{NcvError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named regression metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    /// Mean absolute error
    MAE,
    /// Root mean squared error
    RMSE,
    /// Mean bias error, mean of (predicted - observed)
    MBE,
    /// Coefficient of determination
    R2,
    /// Symmetric mean absolute percentage error (percent)
    SMAPE,
}

impl Metric {
    /// All metrics in reporting order
    pub const ALL: [Metric; 5] = [Metric::MAE, Metric::RMSE, Metric::MBE, Metric::R2, Metric::SMAPE];

    /// Short name used in tables and configuration
    pub fn name(&self) -> &'static str {
        match self {
            Metric::MAE => "MAE",
            Metric::RMSE => "RMSE",
            Metric::MBE => "MBE",
            Metric::R2 => "R2",
            Metric::SMAPE => "SMAPE",
        }
    }

    /// Parse a metric name. Accepts the short names and the scikit-learn
    /// scorer aliases found in experiment configuration files.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mae" | "neg_mean_absolute_error" | "mean_absolute_error" => Ok(Metric::MAE),
            "rmse" | "neg_root_mean_squared_error" | "root_mean_squared_error" => Ok(Metric::RMSE),
            "mbe" | "mean_bias_error" => Ok(Metric::MBE),
            "r2" | "r_squared" => Ok(Metric::R2),
            "smape" | "symmetric_mean_absolute_percentage_error" => Ok(Metric::SMAPE),
            other => Err(NcvError::ConfigError(format!("unknown metric name '{}'", other))),
        }
    }

    /// Whether larger raw values mean a better model
    pub fn greater_is_better(&self) -> bool {
        matches!(self, Metric::R2)
    }

    /// Raw metric value
    pub fn compute(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        match self {
            Metric::MAE => mean_absolute_error(y_true, y_pred),
            Metric::RMSE => root_mean_squared_error(y_true, y_pred),
            Metric::MBE => mean_bias_error(y_true, y_pred),
            Metric::R2 => r2_score(y_true, y_pred),
            Metric::SMAPE => symmetric_mean_absolute_percentage_error(y_true, y_pred),
        }
    }

    /// Scorer value, larger is always better
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let value = self.compute(y_true, y_pred);
        if self.greater_is_better() {
            value
        } else {
            -value
        }
    }

    /// Convert a scorer value back to the raw metric value
    pub fn value_from_score(&self, score: f64) -> f64 {
        if self.greater_is_better() {
            score
        } else {
            -score
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered collection of metrics evaluated on every outer fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRegistry {
    metrics: Vec<Metric>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self {
            metrics: Metric::ALL.to_vec(),
        }
    }
}

impl MetricRegistry {
    /// Registry with all metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry from metric names; unknown names are a configuration error
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Err(NcvError::ConfigError("metric registry must not be empty".to_string()));
        }
        let mut metrics = Vec::with_capacity(names.len());
        for name in names {
            let metric = Metric::from_name(name.as_ref())?;
            if !metrics.contains(&metric) {
                metrics.push(metric);
            }
        }
        Ok(Self { metrics })
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.metrics.contains(&metric)
    }

    /// Scorer values for every registered metric
    pub fn score_all(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<(Metric, f64)> {
        self.metrics
            .iter()
            .map(|m| (*m, m.score(y_true, y_pred)))
            .collect()
    }
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    let mse = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

pub fn mean_bias_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| p - t)
        .sum::<f64>()
        / n
}

/// R² with the scikit-learn convention for a constant target: 1.0 for a
/// perfect fit, 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let y_mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// SMAPE in percent. A pair where both values are zero contributes zero,
/// zero-loss records are common in damage data.
pub fn symmetric_mean_absolute_percentage_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    let total: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| {
            let denom = t.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (p - t).abs() / denom
            }
        })
        .sum();
    100.0 * total / n
}

/// Location summary of observed vs predicted values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmpiricalSummary {
    pub median_true: f64,
    pub median_pred: f64,
    pub mean_true: f64,
    pub mean_pred: f64,
}

/// Compare median and mean of observed and predicted target values
pub fn empirical_vs_predicted(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> EmpiricalSummary {
    EmpiricalSummary {
        median_true: median(y_true),
        median_pred: median(y_pred),
        mean_true: y_true.mean().unwrap_or(f64::NAN),
        mean_pred: y_pred.mean().unwrap_or(f64::NAN),
    }
}

fn median(values: &Array1<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
