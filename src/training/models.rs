//! Estimator capability traits

use crate::error::{NcvError, Result};
use crate::metrics::r2_score;
use crate::optimizer::{ParameterValue, TrialParams};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// An unfitted, configurable regression estimator.
///
/// Fitting never mutates the configuration: `fit` returns a new fitted
/// object, so one candidate can be fit on many folds concurrently.
pub trait Regressor: Clone + Send + Sync {
    type Fitted: FittedRegressor;

    /// Short display name
    fn name(&self) -> String;

    /// Set one hyperparameter by name (without any pipeline prefix)
    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()>;

    /// Copy of this estimator with the given hyperparameters applied
    fn with_params(&self, params: &TrialParams) -> Result<Self> {
        let mut estimator = self.clone();
        for (name, value) in params {
            estimator.set_param(name, value)?;
        }
        Ok(estimator)
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self::Fitted>;

    /// Whether NaN feature values are accepted by `fit` and `predict`
    fn handles_missing(&self) -> bool {
        false
    }
}

/// A fitted estimator
pub trait FittedRegressor: Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities; regressors have none
    fn predict_proba(&self, _x: &Array2<f64>) -> Option<Result<Array2<f64>>> {
        None
    }

    /// Intercept and coefficients of a linear model, together with the
    /// design matrix (the inputs as seen by the linear model) for `x`.
    /// `None` for estimators without a single coefficient vector.
    fn linear_terms(&self, _x: &Array2<f64>) -> Option<Result<LinearTerms>> {
        None
    }

    /// Coefficient of determination on the given data
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let pred = self.predict(x)?;
        Ok(r2_score(y, &pred))
    }
}

/// Linear part of a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearTerms {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    /// Inputs the coefficients apply to, one row per sample
    pub design: Array2<f64>,
}

/// Validate shapes and reject missing values for estimators that cannot
/// take them.
pub(crate) fn check_training_data(
    x: &Array2<f64>,
    y: &Array1<f64>,
    allow_missing: bool,
) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(NcvError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(NcvError::DataError("cannot fit on zero rows".to_string()));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(NcvError::DataError("target contains missing or infinite values".to_string()));
    }
    if !allow_missing && x.iter().any(|v| v.is_nan()) {
        return Err(NcvError::DataError(
            "features contain missing values; drop incomplete rows for this model family".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(NcvError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

pub(crate) fn unknown_param(estimator: &str, name: &str) -> NcvError {
    NcvError::ConfigError(format!("unknown hyperparameter '{}' for {}", name, estimator))
}

fn invalid(name: &str, value: &ParameterValue, reason: &str) -> NcvError {
    NcvError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn param_f64(name: &str, value: &ParameterValue) -> Result<f64> {
    value
        .as_float()
        .ok_or_else(|| invalid(name, value, "expected a number"))
}

pub(crate) fn param_unit_interval(name: &str, value: &ParameterValue) -> Result<f64> {
    let v = param_f64(name, value)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(invalid(name, value, "must lie in [0, 1]"));
    }
    Ok(v)
}

pub(crate) fn param_non_negative(name: &str, value: &ParameterValue) -> Result<f64> {
    let v = param_f64(name, value)?;
    if v < 0.0 {
        return Err(invalid(name, value, "must be non-negative"));
    }
    Ok(v)
}

pub(crate) fn param_usize(name: &str, value: &ParameterValue) -> Result<usize> {
    match value.as_int() {
        Some(v) if v >= 1 => Ok(v as usize),
        Some(_) => Err(invalid(name, value, "must be a positive integer")),
        None => Err(invalid(name, value, "expected an integer")),
    }
}

/// Positive integer or `null`
pub(crate) fn param_opt_usize(name: &str, value: &ParameterValue) -> Result<Option<usize>> {
    if value.is_null() {
        return Ok(None);
    }
    param_usize(name, value).map(Some)
}

pub(crate) fn param_bool(name: &str, value: &ParameterValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid(name, value, "expected a boolean"))
}

pub(crate) fn param_u64(name: &str, value: &ParameterValue) -> Result<u64> {
    match value.as_int() {
        Some(v) if v >= 0 => Ok(v as u64),
        _ => Err(invalid(name, value, "expected a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_check_training_data() {
        let x = array![[1.0, f64::NAN], [2.0, 3.0]];
        let y = array![0.1, 0.2];
        assert!(check_training_data(&x, &y, true).is_ok());
        assert!(matches!(check_training_data(&x, &y, false), Err(NcvError::DataError(_))));
        assert!(check_training_data(&x, &array![0.1], true).is_err());
        assert!(check_training_data(&x, &array![0.1, f64::NAN], true).is_err());
    }

    #[test]
    fn test_param_helpers() {
        assert_eq!(param_f64("alpha", &ParameterValue::Int(2)).unwrap(), 2.0);
        assert!(param_unit_interval("l1_ratio", &ParameterValue::Float(1.5)).is_err());
        assert_eq!(param_opt_usize("max_depth", &ParameterValue::Null).unwrap(), None);
        assert_eq!(param_opt_usize("max_depth", &ParameterValue::Int(4)).unwrap(), Some(4));
        assert!(param_usize("n_estimators", &ParameterValue::Int(0)).is_err());
        assert!(matches!(
            param_bool("bootstrap", &ParameterValue::Float(1.0)),
            Err(NcvError::InvalidParameter { .. })
        ));
    }
}
