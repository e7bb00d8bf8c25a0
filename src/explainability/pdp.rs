//! Partial dependence (average kind)

use crate::error::{NcvError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Result of Partial Dependence computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PDPResult {
    /// Feature index
    pub feature_index: usize,
    /// Feature name (if provided)
    pub feature_name: Option<String>,
    /// Grid values for the feature
    pub grid_values: Vec<f64>,
    /// Average predictions at each grid point
    pub average_predictions: Vec<f64>,
}

impl PDPResult {
    pub fn len(&self) -> usize {
        self.grid_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid_values.is_empty()
    }
}

/// Partial Dependence calculator.
///
/// The grid is the sorted unique values of the feature when there are fewer
/// of them than `grid_resolution`, otherwise `grid_resolution` evenly spaced
/// points between the lower and upper percentiles.
pub struct PartialDependence<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    /// Prediction function
    predict_fn: F,
    /// Number of grid points
    grid_resolution: usize,
    /// Percentile range for grid
    percentile_range: (f64, f64),
    /// Feature names
    feature_names: Option<Vec<String>>,
}

impl<F> PartialDependence<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    /// Create new PDP calculator
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            grid_resolution: 100,
            percentile_range: (5.0, 95.0),
            feature_names: None,
        }
    }

    /// Set number of grid points
    pub fn with_grid_resolution(mut self, n: usize) -> Self {
        self.grid_resolution = n.max(2);
        self
    }

    /// Set percentile range for grid
    pub fn with_percentile_range(mut self, low: f64, high: f64) -> Self {
        self.percentile_range = (low.clamp(0.0, 100.0), high.clamp(0.0, 100.0));
        self
    }

    /// Set feature names
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Compute PDP for a single feature
    pub fn compute(&self, x: &Array2<f64>, feature_index: usize) -> Result<PDPResult> {
        if feature_index >= x.ncols() {
            return Err(NcvError::ValidationError(format!(
                "Feature index {} out of bounds (n_features={})",
                feature_index,
                x.ncols()
            )));
        }
        if x.nrows() == 0 {
            return Err(NcvError::DataError("no rows for partial dependence".to_string()));
        }
        if x.iter().any(|v| v.is_nan()) {
            return Err(NcvError::DataError(
                "partial dependence needs complete rows; drop missing values first".to_string(),
            ));
        }

        let grid_values = self.create_grid(x, feature_index);
        let mut x_modified = x.clone();
        let average_predictions = grid_values
            .iter()
            .map(|&grid_val| -> Result<f64> {
                x_modified.column_mut(feature_index).fill(grid_val);
                let predictions = (self.predict_fn)(&x_modified)?;
                predictions
                    .mean()
                    .ok_or_else(|| NcvError::ComputationError("empty prediction".to_string()))
            })
            .collect::<Result<Vec<f64>>>()?;

        let feature_name = self
            .feature_names
            .as_ref()
            .and_then(|names| names.get(feature_index).cloned());

        Ok(PDPResult {
            feature_index,
            feature_name,
            grid_values,
            average_predictions,
        })
    }

    // Create grid values for a feature
    fn create_grid(&self, x: &Array2<f64>, feature_index: usize) -> Vec<f64> {
        let mut values: Vec<f64> = x.column(feature_index).to_vec();
        values.sort_by(|a, b| a.total_cmp(b));

        let mut unique = values.clone();
        unique.dedup();
        if unique.len() < self.grid_resolution {
            return unique;
        }

        let (low_pct, high_pct) = self.percentile_range;
        let low_val = percentile(&values, low_pct);
        let high_val = percentile(&values, high_pct);

        // Create evenly spaced grid
        let step = (high_val - low_val) / (self.grid_resolution - 1) as f64;
        (0..self.grid_resolution)
            .map(|i| (low_val + i as f64 * step).min(high_val))
            .collect()
    }
}

/// Linear-interpolated percentile of sorted values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let pos = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdp_linear_model() {
        // Simple linear model: y = x0 + 2*x1
        let predict_fn = |x: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(x.rows().into_iter().map(|row| row[0] + 2.0 * row[1]).collect())
        };

        let x = Array2::from_shape_vec(
            (10, 2),
            vec![
                0.0, 0.0, 1.0, 0.5, 2.0, 1.0, 3.0, 1.5, 4.0, 2.0, 5.0, 2.5, 6.0, 3.0, 7.0, 3.5,
                8.0, 4.0, 9.0, 4.5,
            ],
        )
        .unwrap();

        let result = PartialDependence::new(predict_fn)
            .with_grid_resolution(10)
            .compute(&x, 0)
            .unwrap();

        // Ten unique values with a resolution of ten: percentile grid
        assert_eq!(result.len(), 10);
        assert!((result.grid_values[0] - 0.45).abs() < 1e-12);
        assert!((result.grid_values[9] - 8.55).abs() < 1e-12);
        // Slope one in x0, offset by the mean of 2*x1
        for (g, p) in result.grid_values.iter().zip(result.average_predictions.iter()) {
            assert!((p - (g + 4.5)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unique_value_grid() {
        let predict_fn = |x: &Array2<f64>| -> Result<Array1<f64>> { Ok(x.column(0).to_owned()) };
        let x = Array2::from_shape_vec((6, 1), vec![3.0, 1.0, 3.0, 2.0, 1.0, 2.0]).unwrap();
        let result = PartialDependence::new(predict_fn)
            .with_grid_resolution(6)
            .with_feature_names(vec!["depth".into()])
            .compute(&x, 0)
            .unwrap();
        assert_eq!(result.grid_values, vec![1.0, 2.0, 3.0]);
        assert_eq!(result.average_predictions, vec![1.0, 2.0, 3.0]);
        assert_eq!(result.feature_name.as_deref(), Some("depth"));
    }

    #[test]
    fn test_rejects_missing_values() {
        let predict_fn = |x: &Array2<f64>| -> Result<Array1<f64>> { Ok(x.column(0).to_owned()) };
        let x = Array2::from_shape_vec((2, 1), vec![1.0, f64::NAN]).unwrap();
        assert!(matches!(
            PartialDependence::new(predict_fn).compute(&x, 0),
            Err(NcvError::DataError(_))
        ));
        let x = Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap();
        assert!(PartialDependence::new(predict_fn).compute(&x, 3).is_err());
    }

    #[test]
    fn test_percentile() {
        let v = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 50.0), 2.0);
        assert!((percentile(&v, 5.0) - 0.2).abs() < 1e-12);
    }
}
