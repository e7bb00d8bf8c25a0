//! Linear coefficient tables with optional OLS significance

use super::stats::two_sided_p_value;
use crate::error::{NcvError, Result};
use crate::training::{matrix_inverse, LinearTerms};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether standard errors, t-values and p-values are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientSignificance {
    /// Ordinary least squares standard errors on the intercept-augmented
    /// design, two-sided Student-t p-values
    #[default]
    Ols,
    /// Coefficients only
    Omit,
}

impl fmt::Display for CoefficientSignificance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoefficientSignificance::Ols => write!(f, "ols"),
            CoefficientSignificance::Omit => write!(f, "omit"),
        }
    }
}

/// One row of a coefficient table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub feature: String,
    pub coefficient: f64,
    pub std_error: Option<f64>,
    pub t_value: Option<f64>,
    pub p_value: Option<f64>,
}

/// Coefficients of a fitted linear model, intercept first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub rows: Vec<CoefficientRow>,
    pub significance: CoefficientSignificance,
    /// Residual degrees of freedom `n - p` of the augmented design
    pub residual_df: Option<usize>,
}

impl CoefficientTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, feature: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.feature == feature)
    }
}

/// Standard error, t statistic and p-value of one coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsStatistic {
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// OLS significance of `beta` (intercept first) on `[1, design]`.
///
/// `SE_i = sqrt(MSE * diag((AᵗA)⁻¹)_i)` with `MSE = Σ(y - Aβ)² / (n - p)`,
/// where `A` is the design with a leading column of ones and `p` its number
/// of columns.
pub fn ols_significance(
    design: &Array2<f64>,
    y: &Array1<f64>,
    beta: &Array1<f64>,
) -> Result<Vec<OlsStatistic>> {
    let n = design.nrows();
    let p = design.ncols() + 1;
    if y.len() != n {
        return Err(NcvError::ShapeError {
            expected: format!("{} targets", n),
            actual: format!("{} targets", y.len()),
        });
    }
    if beta.len() != p {
        return Err(NcvError::ShapeError {
            expected: format!("{} coefficients including the intercept", p),
            actual: format!("{} coefficients", beta.len()),
        });
    }
    if n <= p {
        return Err(NcvError::DataError(format!(
            "significance needs more rows than coefficients ({} rows, {} coefficients)",
            n, p
        )));
    }
    if design.iter().any(|v| !v.is_finite()) {
        return Err(NcvError::DataError(
            "design matrix contains missing or infinite values".to_string(),
        ));
    }

    let augmented = Array2::from_shape_fn((n, p), |(i, j)| if j == 0 { 1.0 } else { design[[i, j - 1]] });

    let fitted = augmented.dot(beta);
    let ssr: f64 = y.iter().zip(fitted.iter()).map(|(t, f)| (t - f).powi(2)).sum();
    let df = (n - p) as f64;
    let mse = ssr / df;

    let gram = augmented.t().dot(&augmented);
    let gram_inv = matrix_inverse(&gram).ok_or_else(|| {
        NcvError::ComputationError("design matrix is singular; standard errors are undefined".to_string())
    })?;

    (0..p)
        .map(|i| {
            let var = mse * gram_inv[[i, i]];
            if var < 0.0 || !var.is_finite() {
                return Err(NcvError::ComputationError(format!(
                    "negative variance estimate for coefficient {}",
                    i
                )));
            }
            let std_error = var.sqrt();
            let t_value = beta[i] / std_error;
            Ok(OlsStatistic {
                std_error,
                t_value,
                p_value: two_sided_p_value(t_value, df),
            })
        })
        .collect()
}

/// Coefficient table from the linear part of a fitted model
pub fn coefficient_table(
    terms: &LinearTerms,
    y: &Array1<f64>,
    feature_names: &[String],
    significance: CoefficientSignificance,
) -> Result<CoefficientTable> {
    if feature_names.len() != terms.coefficients.len() {
        return Err(NcvError::ShapeError {
            expected: format!("{} feature names", terms.coefficients.len()),
            actual: format!("{} feature names", feature_names.len()),
        });
    }

    let mut beta = Vec::with_capacity(terms.coefficients.len() + 1);
    beta.push(terms.intercept);
    beta.extend(terms.coefficients.iter().copied());
    let beta = Array1::from(beta);

    let names = std::iter::once("intercept".to_string()).chain(feature_names.iter().cloned());

    let (stats, residual_df) = match significance {
        CoefficientSignificance::Ols => {
            let stats = ols_significance(&terms.design, y, &beta)?;
            let df = terms.design.nrows() - beta.len();
            (Some(stats), Some(df))
        }
        CoefficientSignificance::Omit => (None, None),
    };

    let rows = names
        .enumerate()
        .map(|(i, feature)| {
            let stat = stats.as_ref().map(|s| s[i]);
            CoefficientRow {
                feature,
                coefficient: beta[i],
                std_error: stat.map(|s| s.std_error),
                t_value: stat.map(|s| s.t_value),
                p_value: stat.map(|s| s.p_value),
            }
        })
        .collect();

    Ok(CoefficientTable {
        rows,
        significance,
        residual_df,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn synthetic(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let x = Array2::from_shape_fn((n, 3), |_| normal.sample(&mut rng));
        let noise = Normal::new(0.0, 0.5).unwrap();
        let y = x.map_axis(Axis(1), |r| 1.5 + 2.0 * r[0] - 1.0 * r[1] + 0.05 * r[2])
            + Array1::from_shape_fn(n, |_| noise.sample(&mut rng));
        (x, y)
    }

    #[test]
    fn test_table_layout() {
        let (x, y) = synthetic(30);
        let terms = LinearTerms {
            intercept: 1.5,
            coefficients: Array1::from(vec![2.0, -1.0, 0.0]),
            design: x,
        };
        let names: Vec<String> = vec!["depth".into(), "duration".into(), "velocity".into()];

        let table = coefficient_table(&terms, &y, &names, CoefficientSignificance::Ols).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rows[0].feature, "intercept");
        assert_eq!(table.rows[0].coefficient, 1.5);
        assert_eq!(table.residual_df, Some(26));
        assert!(table.rows.iter().all(|r| r.p_value.is_some()));
        assert_eq!(table.get("velocity").unwrap().t_value, Some(0.0));

        let table = coefficient_table(&terms, &y, &names, CoefficientSignificance::Omit).unwrap();
        assert!(table.rows.iter().all(|r| r.std_error.is_none() && r.p_value.is_none()));
        assert_eq!(table.get("duration").unwrap().coefficient, -1.0);
    }

    #[test]
    fn test_degenerate_designs() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 2.0, 4.0, 3.0, 6.0]).unwrap();
        let y = Array1::from(vec![1.0, 2.0, 3.0]);
        let beta = Array1::from(vec![0.0, 1.0, 0.0]);
        assert!(matches!(ols_significance(&x, &y, &beta), Err(NcvError::DataError(_))));

        // Collinear columns
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i as f64) * (j as f64 + 1.0));
        let y = Array1::from_shape_fn(6, |i| i as f64);
        assert!(matches!(ols_significance(&x, &y, &beta), Err(NcvError::ComputationError(_))));
    }
}
