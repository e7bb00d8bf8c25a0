//! Linear model implementations

use super::models::{
    check_n_features, check_training_data, param_bool, param_f64, param_non_negative, param_unit_interval,
    param_usize, unknown_param, FittedRegressor, LinearTerms, Regressor,
};
use crate::error::{NcvError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Simple matrix inversion for small matrices using Gauss-Jordan elimination
pub(crate) fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // Create augmented matrix [M | I]
    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    let scale = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs())).max(1.0);

    for col in 0..n {
        // Partial pivoting
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-12 * scale {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                if factor != 0.0 {
                    for j in 0..2 * n {
                        aug[[row, j]] -= factor * aug[[col, j]];
                    }
                }
            }
        }
    }

    Some(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Soft-threshold operator for the L1 proximal step
fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

/// Elastic Net regression (L1 + L2 regularization via coordinate descent).
///
/// Minimizes `1/(2n) ||y - Xw - b||² + alpha * l1_ratio * ||w||₁
/// + alpha * (1 - l1_ratio) / 2 * ||w||²`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNet {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// Overall regularization strength
    pub alpha: f64,
    /// L1 ratio (0.0 = pure L2/Ridge, 1.0 = pure L1/Lasso)
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub is_fitted: bool,
}

impl Default for ElasticNet {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl ElasticNet {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            l1_ratio: l1_ratio.clamp(0.0, 1.0),
            max_iter: 1000,
            tol: 1e-4,
            is_fitted: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_l1_ratio(mut self, l1_ratio: f64) -> Self {
        self.l1_ratio = l1_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn fit_in_place(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y, false)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let (x_c, y_c, x_mean, y_mean) = if self.fit_intercept {
            let xm = x
                .mean_axis(Axis(0))
                .ok_or_else(|| NcvError::DataError("cannot center zero rows".to_string()))?;
            let ym = y.mean().unwrap_or(0.0);
            (x - &xm.clone().insert_axis(Axis(0)), y - ym, xm, ym)
        } else {
            (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
        };

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w = Array1::<f64>::zeros(n_features);
        let n = n_samples as f64;
        let l1_penalty = self.alpha * self.l1_ratio * n;
        let l2_penalty = self.alpha * (1.0 - self.l1_ratio) * n;

        // Convergence on the largest coordinate update, relative to the largest weight
        let mut converged = false;
        let mut r = &y_c - &x_c.dot(&w);
        for _iter in 0..self.max_iter {
            let mut max_change = 0.0f64;
            let mut max_weight = 0.0f64;

            for j in 0..n_features {
                let denom = col_norms[j] + l2_penalty;
                if denom < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                // Incremental residual: rho = x_j^T r + col_norms[j] * w[j]
                let rho = x_c.column(j).dot(&r) + col_norms[j] * w[j];
                let old_wj = w[j];
                w[j] = soft_threshold(rho, l1_penalty) / denom;
                let delta = old_wj - w[j];
                if delta != 0.0 {
                    r.scaled_add(delta, &x_c.column(j));
                }
                max_change = max_change.max(delta.abs());
                max_weight = max_weight.max(w[j].abs());
            }

            if max_weight == 0.0 || max_change / max_weight < self.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                max_iter = self.max_iter,
                alpha = self.alpha,
                l1_ratio = self.l1_ratio,
                "Elastic net coordinate descent did not converge"
            );
            return Err(NcvError::ConvergenceError {
                iterations: self.max_iter,
            });
        }

        self.intercept = Some(y_mean - w.dot(&x_mean));
        self.coefficients = Some(w);
        self.is_fitted = true;
        Ok(())
    }
}

impl Regressor for ElasticNet {
    type Fitted = ElasticNet;

    fn name(&self) -> String {
        "ElasticNet".to_string()
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        match name {
            "alpha" => self.alpha = param_non_negative(name, value)?,
            "l1_ratio" => self.l1_ratio = param_unit_interval(name, value)?,
            "max_iter" => self.max_iter = param_usize(name, value)?,
            "tol" => self.tol = param_f64(name, value)?,
            "fit_intercept" => self.fit_intercept = param_bool(name, value)?,
            _ => return Err(unknown_param("ElasticNet", name)),
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ElasticNet> {
        let mut model = self.clone();
        model.fit_in_place(x, y)?;
        Ok(model)
    }
}

impl FittedRegressor for ElasticNet {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (w, b) = match (&self.coefficients, self.intercept) {
            (Some(w), Some(b)) if self.is_fitted => (w, b),
            _ => return Err(NcvError::ModelNotFitted),
        };
        check_n_features(w.len(), x)?;
        Ok(x.dot(w) + b)
    }

    fn linear_terms(&self, x: &Array2<f64>) -> Option<Result<LinearTerms>> {
        let (w, b) = match (&self.coefficients, self.intercept) {
            (Some(w), Some(b)) if self.is_fitted => (w, b),
            _ => return Some(Err(NcvError::ModelNotFitted)),
        };
        Some(check_n_features(w.len(), x).map(|_| LinearTerms {
            intercept: b,
            coefficients: w.clone(),
            design: x.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_elastic_net() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let model = ElasticNet::new(0.01, 0.5).with_max_iter(10_000).fit(&x, &y).unwrap();
        assert!(model.is_fitted);
        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.9, "ElasticNet R² = {}", r2);
    }

    #[test]
    fn test_near_ols_with_tiny_alpha() {
        // y = 1 + 2*x1 - 3*x2
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.2], [0.3, 0.9]];
        let y = x.map_axis(Axis(1), |r| 1.0 + 2.0 * r[0] - 3.0 * r[1]);
        let mut config = ElasticNet::new(1e-8, 0.5).with_max_iter(100_000);
        config.tol = 1e-12;
        let model = config.fit(&x, &y).unwrap();
        let w = model.coefficients.as_ref().unwrap();
        assert!((w[0] - 2.0).abs() < 1e-3);
        assert!((w[1] + 3.0).abs() < 1e-3);
        assert!((model.intercept.unwrap() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_strong_l1_zeroes_coefficients() {
        let x = array![[1.0, 0.3], [2.0, 0.1], [3.0, 0.4], [4.0, 0.2]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let model = ElasticNet::new(100.0, 1.0).fit(&x, &y).unwrap();
        assert!(model.coefficients.as_ref().unwrap().iter().all(|&c| c == 0.0));
        // Intercept falls back to the target mean
        assert!((model.intercept.unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_convergence_is_an_error() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * (j + 3) + 2 * j) % 11) as f64);
        let y = x.map_axis(Axis(1), |r| 0.4 * r[0] - 0.2 * r[1] + 0.1 * r[2]);
        let mut config = ElasticNet::new(1e-6, 0.5).with_max_iter(1);
        config.tol = 1e-12;
        assert!(matches!(
            config.fit(&x, &y),
            Err(NcvError::ConvergenceError { iterations: 1 })
        ));

        let model = config.with_max_iter(100_000).fit(&x, &y).unwrap();
        assert!(model.is_fitted);
    }

    #[test]
    fn test_fit_does_not_mutate_configuration() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let config = ElasticNet::default();
        let _ = config.fit(&x, &y).unwrap();
        assert!(!config.is_fitted);
        assert!(matches!(config.predict(&x), Err(NcvError::ModelNotFitted)));
    }

    #[test]
    fn test_rejects_missing_values() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        assert!(matches!(ElasticNet::default().fit(&x, &y), Err(NcvError::DataError(_))));
    }

    #[test]
    fn test_set_params() {
        let mut model = ElasticNet::default();
        model.set_param("alpha", &ParameterValue::Float(0.3)).unwrap();
        model.set_param("l1_ratio", &ParameterValue::Int(1)).unwrap();
        assert_eq!(model.alpha, 0.3);
        assert_eq!(model.l1_ratio, 1.0);
        assert!(model.set_param("n_estimators", &ParameterValue::Int(3)).is_err());
        assert!(model.set_param("l1_ratio", &ParameterValue::Float(2.0)).is_err());
    }

    #[test]
    fn test_linear_terms() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 3.0, 5.0];
        let model = ElasticNet::new(1e-10, 0.5).fit(&x, &y).unwrap();
        let terms = model.linear_terms(&x).unwrap().unwrap();
        assert!((terms.coefficients[0] - 2.0).abs() < 1e-4);
        assert_eq!(terms.design, x);
    }

    #[test]
    fn test_matrix_inverse() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = matrix_inverse(&m).unwrap();
        let identity = m.dot(&inv);
        assert!((identity[[0, 0]] - 1.0).abs() < 1e-12);
        assert!(identity[[0, 1]].abs() < 1e-12);
        assert!(matrix_inverse(&array![[1.0, 2.0], [2.0, 4.0]]).is_none());
    }
}
