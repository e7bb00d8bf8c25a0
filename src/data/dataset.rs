//! In-memory flood-loss dataset

use crate::error::{NcvError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// How a model family deals with missing feature values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValuePolicy {
    /// The estimator routes missing values itself; keep incomplete rows
    Native,
    /// Only rows without any missing feature value are used
    CompleteCases,
}

/// Feature matrix plus target vector with named columns.
///
/// Missing values are stored as NaN. A dataset is immutable: the filtering
/// passes return new datasets.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    target_name: String,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Dataset {
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
        target_name: impl Into<String>,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(NcvError::ShapeError {
                expected: format!("{} target values", x.nrows()),
                actual: format!("{} target values", y.len()),
            });
        }
        if x.ncols() != feature_names.len() {
            return Err(NcvError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        Ok(Self {
            feature_names,
            target_name: target_name.into(),
            x,
            y,
        })
    }

    /// Build a dataset from a data frame. Every column other than the target
    /// becomes a feature; nulls are turned into NaN.
    pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<Self> {
        if df.column(target).is_err() {
            return Err(NcvError::FeatureNotFound(target.to_string()));
        }

        let feature_names: Vec<String> = df
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .filter(|name| name != target)
            .collect();

        let y = Array1::from(column_to_f64(df, target)?);
        let columns = feature_names
            .iter()
            .map(|name| column_to_f64(df, name))
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let x = Array2::from_shape_fn((df.height(), feature_names.len()), |(r, c)| columns[c][r]);

        Self::new(x, y, feature_names, target)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Position of a feature column
    pub fn feature_index(&self, name: &str) -> Result<usize> {
        self.feature_names
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| NcvError::FeatureNotFound(name.to_string()))
    }

    /// Number of records with a zero target value
    pub fn zero_target_count(&self) -> usize {
        self.y.iter().filter(|&&v| v == 0.0).count()
    }

    pub fn has_missing_features(&self) -> bool {
        self.x.iter().any(|v| v.is_nan())
    }

    /// Rows subset, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            target_name: self.target_name.clone(),
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Drop rows whose target is missing. Returns the filtered dataset and
    /// the number of dropped rows.
    pub fn drop_missing_target(&self) -> Result<(Self, usize)> {
        let keep: Vec<usize> = (0..self.n_rows()).filter(|&i| !self.y[i].is_nan()).collect();
        if keep.is_empty() {
            return Err(NcvError::DataError(format!(
                "target '{}' has no observed values",
                self.target_name
            )));
        }
        let dropped = self.n_rows() - keep.len();
        Ok((self.select_rows(&keep), dropped))
    }

    /// Drop rows with any missing value (features or target)
    pub fn drop_incomplete_rows(&self) -> Result<(Self, usize)> {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| !self.y[i].is_nan() && self.x.row(i).iter().all(|v| !v.is_nan()))
            .collect();
        if keep.is_empty() {
            return Err(NcvError::DataError(format!(
                "no complete rows left for target '{}'",
                self.target_name
            )));
        }
        let dropped = self.n_rows() - keep.len();
        Ok((self.select_rows(&keep), dropped))
    }

    /// Apply the filtering passes for one model family: missing-target rows
    /// always go, incomplete rows only under `CompleteCases`.
    pub fn prepare_for(&self, policy: MissingValuePolicy) -> Result<Self> {
        let (data, dropped_target) = self.drop_missing_target()?;
        info!(
            target = %self.target_name,
            dropped = dropped_target,
            "Dropped records with missing target"
        );

        let data = match policy {
            MissingValuePolicy::Native => data,
            MissingValuePolicy::CompleteCases => data.drop_incomplete_rows()?.0,
        };

        info!(
            rows = data.n_rows(),
            zero_loss = data.zero_target_count(),
            "Records used for model fitting"
        );
        Ok(data)
    }

    /// Reorder (and subset) the feature columns
    pub fn with_feature_order(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|n| self.feature_index(n))
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self {
            feature_names: names.to_vec(),
            target_name: self.target_name.clone(),
            x: self.x.select(Axis(1), &indices),
            y: self.y.clone(),
        })
    }

    /// Data frame with the target as first column followed by the features
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.n_features() + 1);
        columns.push(Series::new(self.target_name.as_str().into(), self.y.to_vec()).into());
        for (j, name) in self.feature_names.iter().enumerate() {
            columns.push(Series::new(name.as_str().into(), self.x.column(j).to_vec()).into());
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| NcvError::FeatureNotFound(name.to_string()))?
        .as_materialized_series()
        .cast(&DataType::Float64)?;

    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df! {
            "water_depth" => [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)],
            "flow_velocity" => [Some(0.1), Some(0.2), Some(0.3), Some(0.4), Some(0.5)],
            "rloss" => [Some(0.0), None, Some(0.3), Some(0.1), Some(0.0)],
        }
        .unwrap()
    }

    #[test]
    fn test_from_dataframe() {
        let data = Dataset::from_dataframe(&sample_frame(), "rloss").unwrap();
        assert_eq!(data.feature_names(), &["water_depth", "flow_velocity"]);
        assert_eq!(data.n_rows(), 5);
        assert!(data.x()[[2, 0]].is_nan());
        assert!(data.y()[1].is_nan());
        assert!(data.has_missing_features());
    }

    #[test]
    fn test_unknown_target() {
        let result = Dataset::from_dataframe(&sample_frame(), "bi");
        assert!(matches!(result, Err(NcvError::FeatureNotFound(_))));
    }

    #[test]
    fn test_drop_missing_target() {
        let data = Dataset::from_dataframe(&sample_frame(), "rloss").unwrap();
        let (filtered, dropped) = data.drop_missing_target().unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(filtered.n_rows(), 4);
        assert!(filtered.y().iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_policies() {
        let data = Dataset::from_dataframe(&sample_frame(), "rloss").unwrap();
        let native = data.prepare_for(MissingValuePolicy::Native).unwrap();
        let complete = data.prepare_for(MissingValuePolicy::CompleteCases).unwrap();
        assert_eq!(native.n_rows(), 4);
        assert_eq!(complete.n_rows(), 3);
        assert!(!complete.has_missing_features());
        assert_eq!(complete.zero_target_count(), 2);
    }

    #[test]
    fn test_all_missing_target_is_error() {
        let df = df! {
            "a" => [1.0, 2.0],
            "t" => [None::<f64>, None],
        }
        .unwrap();
        let data = Dataset::from_dataframe(&df, "t").unwrap();
        assert!(matches!(data.drop_missing_target(), Err(NcvError::DataError(_))));
    }

    #[test]
    fn test_feature_order_and_frame() {
        let data = Dataset::from_dataframe(&sample_frame(), "rloss").unwrap();
        let reordered = data
            .with_feature_order(&["flow_velocity".to_string(), "water_depth".to_string()])
            .unwrap();
        assert_eq!(reordered.x()[[0, 0]], 0.1);

        let df = reordered.to_dataframe().unwrap();
        let names: Vec<String> = df.get_columns().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["rloss", "flow_velocity", "water_depth"]);
    }
}
