//! Tables and model files written after each (year, target) combination
//!
//! Layout below the output root:
//!
//! ```text
//! models_trained/nested_cv_models/<aoi>/<family>_<target>_<year>_<aoi>.json
//! models_trained/final_models/<aoi>/<family>_<target>_<year>_<aoi>.json
//! models_evaluation/<aoi>/performance_<target>_<year>_<aoi>.csv
//! models_evaluation/<aoi>/feature_importances_<target>_<year>_<aoi>.csv
//! models_evaluation/<aoi>/regression_coefficients_<family>_<target>_<year>_<aoi>.csv
//! models_evaluation/<aoi>/residuals_<family>_<target>_<year>_<aoi>.csv
//! models_evaluation/<aoi>/pdp_<family>_<feature>_<target>_<year>_<aoi>.csv
//! selected_features/<aoi>/final_predictors_<target>_<year>_<aoi>.csv
//! ```

use super::runner::TargetReport;
use crate::data::save_csv;
use crate::error::{NcvError, Result};
use crate::evaluation::{CoefficientTable, ResidualTable};
use crate::explainability::PDPResult;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the artifacts of a [`TargetReport`]
#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
    aoi_and_floodtype: String,
}

impl ReportWriter {
    pub fn new(root: &Path, aoi_and_floodtype: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            aoi_and_floodtype: aoi_and_floodtype.to_string(),
        }
    }

    pub fn evaluation_dir(&self) -> PathBuf {
        self.root.join("models_evaluation").join(&self.aoi_and_floodtype)
    }

    pub fn nested_cv_dir(&self) -> PathBuf {
        self.root
            .join("models_trained")
            .join("nested_cv_models")
            .join(&self.aoi_and_floodtype)
    }

    pub fn final_model_dir(&self) -> PathBuf {
        self.root
            .join("models_trained")
            .join("final_models")
            .join(&self.aoi_and_floodtype)
    }

    pub fn selected_features_dir(&self) -> PathBuf {
        self.root.join("selected_features").join(&self.aoi_and_floodtype)
    }

    fn suffix(&self, report: &TargetReport) -> String {
        format!("{}_{}_{}", report.target, report.year, self.aoi_and_floodtype)
    }

    /// Write every table and model file; returns the written paths
    pub fn write(&self, report: &TargetReport) -> Result<Vec<PathBuf>> {
        let suffix = self.suffix(report);
        let eval_dir = self.evaluation_dir();
        let mut written = Vec::new();

        let path = eval_dir.join(format!("performance_{}.csv", suffix));
        save_csv(&mut performance_table(report)?, &path)?;
        written.push(path);

        let path = eval_dir.join(format!("feature_importances_{}.csv", suffix));
        save_csv(&mut importance_table(report)?, &path)?;
        written.push(path);

        for family in &report.families {
            let label = &family.label;

            let path = self.nested_cv_dir().join(format!("{}_{}.json", label, suffix));
            fs::create_dir_all(self.nested_cv_dir())?;
            fs::write(&path, serde_json::to_string_pretty(&family.search)?)?;
            written.push(path);

            let path = self.final_model_dir().join(format!("{}_{}.json", label, suffix));
            family.final_model.estimator.save_json(&path)?;
            written.push(path);

            let path = eval_dir.join(format!("residuals_{}_{}.csv", label, suffix));
            save_csv(&mut residual_frame(&family.residuals)?, &path)?;
            written.push(path);

            if let Some(table) = &family.coefficients {
                let path = eval_dir.join(format!("regression_coefficients_{}_{}.csv", label, suffix));
                save_csv(&mut coefficient_frame(table)?, &path)?;
                written.push(path);
            }

            for pdp in &family.partial_dependence {
                let feature = pdp
                    .feature_name
                    .clone()
                    .unwrap_or_else(|| format!("x{}", pdp.feature_index));
                let path = eval_dir.join(format!("pdp_{}_{}_{}.csv", label, feature, suffix));
                save_csv(&mut pdp_frame(pdp)?, &path)?;
                written.push(path);
            }
        }

        let path = self
            .selected_features_dir()
            .join(format!("final_predictors_{}.csv", suffix));
        save_csv(&mut report.selected_data.to_dataframe()?, &path)?;
        written.push(path);

        info!(
            target = %report.target,
            year = %report.year,
            files = written.len(),
            dir = %self.root.display(),
            "Saved results"
        );
        Ok(written)
    }
}

/// Outer-fold mean and sample std per metric (rows) and family (columns).
/// Values are raw metric values, so MAE and RMSE are non-negative.
pub fn performance_table(report: &TargetReport) -> Result<DataFrame> {
    let first = report
        .families
        .first()
        .ok_or_else(|| NcvError::DataError("report has no model families".to_string()))?;
    let metrics: Vec<_> = first.summaries.iter().map(|s| s.metric).collect();

    let mut columns: Vec<Column> = Vec::with_capacity(1 + 2 * report.families.len());
    let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
    columns.push(Series::new("metric".into(), names).into());

    for family in &report.families {
        let mut means = Vec::with_capacity(metrics.len());
        let mut stds = Vec::with_capacity(metrics.len());
        for metric in &metrics {
            let summary = family.summary(*metric).ok_or_else(|| {
                NcvError::DataError(format!("family {} has no {} summary", family.label, metric))
            })?;
            means.push(summary.mean);
            stds.push(summary.std);
        }
        columns.push(Series::new(format!("{}_score", family.label).as_str().into(), means).into());
        columns.push(Series::new(format!("{}_score_std", family.label).as_str().into(), stds).into());
    }
    Ok(DataFrame::new(columns)?)
}

/// Per-family mean importances, their weighted versions and the weighted
/// sum, rows ordered by the combined ranking
pub fn importance_table(report: &TargetReport) -> Result<DataFrame> {
    let agg = &report.importance;
    let order = agg.ranking();

    let mut columns: Vec<Column> = Vec::with_capacity(2 + 2 * agg.families.len());
    let features: Vec<&str> = order.iter().map(|&i| agg.feature_names[i].as_str()).collect();
    columns.push(Series::new("feature".into(), features).into());

    for (family, weighted) in agg.families.iter().zip(agg.weighted.iter()) {
        let raw: Vec<f64> = order.iter().map(|&i| family.importances[i]).collect();
        let scaled: Vec<f64> = order.iter().map(|&i| weighted[i]).collect();
        columns.push(Series::new(format!("{}_importances", family.family).as_str().into(), raw).into());
        columns.push(
            Series::new(format!("{}_importances_weighted", family.family).as_str().into(), scaled).into(),
        );
    }

    let sums: Vec<f64> = order.iter().map(|&i| agg.weighted_sum[i]).collect();
    columns.push(Series::new("weighted_sum_importances".into(), sums).into());
    Ok(DataFrame::new(columns)?)
}

pub fn coefficient_frame(table: &CoefficientTable) -> Result<DataFrame> {
    let features: Vec<&str> = table.rows.iter().map(|r| r.feature.as_str()).collect();
    let coefficients: Vec<f64> = table.rows.iter().map(|r| r.coefficient).collect();
    let std_errors: Vec<Option<f64>> = table.rows.iter().map(|r| r.std_error).collect();
    let t_values: Vec<Option<f64>> = table.rows.iter().map(|r| r.t_value).collect();
    let p_values: Vec<Option<f64>> = table.rows.iter().map(|r| r.p_value).collect();

    Ok(DataFrame::new(vec![
        Series::new("feature".into(), features).into(),
        Series::new("coefficient".into(), coefficients).into(),
        Series::new("std_error".into(), std_errors).into(),
        Series::new("t_value".into(), t_values).into(),
        Series::new("p_value".into(), p_values).into(),
    ])?)
}

pub fn residual_frame(residuals: &ResidualTable) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Series::new("y_true".into(), residuals.y_true.to_vec()).into(),
        Series::new("y_pred".into(), residuals.y_pred.to_vec()).into(),
        Series::new("residual".into(), residuals.residuals.to_vec()).into(),
    ])?)
}

/// Grid values under the feature's name and the averaged prediction as `yhat`
pub fn pdp_frame(pdp: &PDPResult) -> Result<DataFrame> {
    let feature = pdp
        .feature_name
        .clone()
        .unwrap_or_else(|| format!("x{}", pdp.feature_index));
    Ok(DataFrame::new(vec![
        Series::new(feature.as_str().into(), pdp.grid_values.clone()).into(),
        Series::new("yhat".into(), pdp.average_predictions.clone()).into(),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{CoefficientRow, CoefficientSignificance};
    use ndarray::array;

    #[test]
    fn test_residual_frame() {
        let table = ResidualTable::new(array![1.0, 2.0], array![0.5, 2.5]).unwrap();
        let df = residual_frame(&table).unwrap();
        assert_eq!(df.shape(), (2, 3));
        let residual: Vec<Option<f64>> = df.column("residual").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(residual, vec![Some(0.5), Some(-0.5)]);
    }

    #[test]
    fn test_coefficient_frame_nulls() {
        let table = CoefficientTable {
            rows: vec![
                CoefficientRow {
                    feature: "intercept".into(),
                    coefficient: 0.2,
                    std_error: None,
                    t_value: None,
                    p_value: None,
                },
                CoefficientRow {
                    feature: "water_depth".into(),
                    coefficient: 0.7,
                    std_error: None,
                    t_value: None,
                    p_value: None,
                },
            ],
            significance: CoefficientSignificance::Omit,
            residual_df: None,
        };
        let df = coefficient_frame(&table).unwrap();
        assert_eq!(df.shape(), (2, 5));
        assert_eq!(df.column("p_value").unwrap().null_count(), 2);
    }

    #[test]
    fn test_pdp_frame() {
        let pdp = PDPResult {
            feature_index: 0,
            feature_name: Some("water_depth".into()),
            grid_values: vec![0.0, 0.5, 1.0],
            average_predictions: vec![0.1, 0.2, 0.4],
        };
        let df = pdp_frame(&pdp).unwrap();
        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["water_depth", "yhat"]);
    }
}
