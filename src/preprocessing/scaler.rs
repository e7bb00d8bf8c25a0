//! Min-max feature scaling

use crate::error::{NcvError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column min-max scaler mapping observed values onto `[0, 1]`.
///
/// Missing values (NaN) are ignored while fitting and pass through
/// `transform` unchanged, so the booster still sees them as missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl MinMaxScaler {
    /// Create a new unfitted scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn column minima and ranges
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(NcvError::DataError("cannot fit scaler on zero rows".to_string()));
        }

        let n_cols = x.ncols();
        let mut data_min = Array1::zeros(n_cols);
        let mut scale = Array1::ones(n_cols);

        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let (min, max) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

            // Column without a single observed value: leave it untouched
            if !min.is_finite() || !max.is_finite() {
                continue;
            }

            let range = max - min;
            data_min[j] = min;
            scale[j] = if range == 0.0 { 1.0 } else { range };
        }

        self.data_min = Some(data_min);
        self.scale = Some(scale);
        Ok(self)
    }

    /// Apply the learned scaling
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (data_min, scale) = match (&self.data_min, &self.scale) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(NcvError::ModelNotFitted),
        };

        if x.ncols() != data_min.len() {
            return Err(NcvError::ShapeError {
                expected: format!("{} columns", data_min.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (lo, s) = (data_min[j], scale[j]);
            column.mapv_inplace(|v| (v - lo) / s);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn is_fitted(&self) -> bool {
        self.data_min.is_some()
    }
}
