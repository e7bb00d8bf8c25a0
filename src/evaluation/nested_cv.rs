//! Nested cross-validation evaluator
//!
//! The outer loop estimates generalization error of the whole
//! tune-and-refit procedure: on every outer fold the randomized search is
//! re-run on the outer-training rows only (inner folds), its refit winner is
//! scored on the outer-test rows with every registered metric, and the
//! fitted winner is kept. A separate non-repeated k-fold pass gives one
//! out-of-fold prediction per sample for the residual table.

use super::coefficients::{coefficient_table, CoefficientSignificance, CoefficientTable};
use super::selection::{select_final, Selection, TieBreak};
use crate::data::Dataset;
use crate::error::{NcvError, Result};
use crate::explainability::{ImportanceResult, PDPResult, PartialDependence, PermutationImportance};
use crate::metrics::{empirical_vs_predicted, EmpiricalSummary, Metric, MetricRegistry};
use crate::optimizer::{format_params, RandomizedSearch, TrialParams};
use crate::preprocessing::MinMaxScaler;
use crate::training::{CVResults, CvPlan, FittedRegressor, Regressor};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One outer fold: the tuned-and-refit model and its held-out scores
#[derive(Debug, Clone)]
pub struct OuterFold<F> {
    /// Position in the repeated k-fold sequence, `repeat * k + fold`
    pub index: usize,
    pub repeat: usize,
    pub best_params: TrialParams,
    /// Mean inner-fold score of the selected candidate
    pub search_score: f64,
    /// Standard deviation of the selected candidate's inner-fold scores
    pub search_std: f64,
    /// Scorer values (greater is better) on the outer-test rows
    pub scores: BTreeMap<Metric, f64>,
    pub n_test: usize,
    /// Rows of the evaluator matrix the estimator was refit on
    pub train_indices: Vec<usize>,
    pub estimator: F,
}

/// Mean and sample standard deviation of one metric over the outer folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: Metric,
    /// Mean raw metric value
    pub mean: f64,
    /// Sample standard deviation (n - 1) of the raw values
    pub std: f64,
}

/// Per-fold scores and fitted estimators of the outer loop, in fold order
#[derive(Debug, Clone)]
pub struct OuterScores<F> {
    metrics: Vec<Metric>,
    folds: Vec<OuterFold<F>>,
}

impl<F> OuterScores<F> {
    pub fn new(metrics: Vec<Metric>, folds: Vec<OuterFold<F>>) -> Self {
        Self { metrics, folds }
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn folds(&self) -> &[OuterFold<F>] {
        &self.folds
    }

    pub fn fold(&self, index: usize) -> Option<&OuterFold<F>> {
        self.folds.get(index)
    }

    /// Scorer values of one metric, one per outer fold
    pub fn scores(&self, metric: Metric) -> Result<Vec<f64>> {
        if !self.metrics.contains(&metric) {
            return Err(NcvError::ConfigError(format!(
                "metric {} is not part of the evaluation registry",
                metric
            )));
        }
        self.folds
            .iter()
            .map(|fold| {
                fold.scores.get(&metric).copied().ok_or_else(|| {
                    NcvError::ComputationError(format!("fold {} has no {} score", fold.index, metric))
                })
            })
            .collect()
    }

    /// Raw metric values (sign restored), one per outer fold
    pub fn values(&self, metric: Metric) -> Result<Vec<f64>> {
        Ok(self
            .scores(metric)?
            .into_iter()
            .map(|s| metric.value_from_score(s))
            .collect())
    }

    pub fn summary(&self, metric: Metric) -> Result<MetricSummary> {
        let values = self.values(metric)?;
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Ok(MetricSummary { metric, mean, std })
    }

    /// Summaries of every registered metric, in registry order
    pub fn summaries(&self) -> Result<Vec<MetricSummary>> {
        self.metrics.iter().map(|m| self.summary(*m)).collect()
    }

    pub fn estimators(&self) -> Vec<&F> {
        self.folds.iter().map(|f| &f.estimator).collect()
    }

    /// Inner-search standard deviation of every fold's selected candidate
    pub fn search_stds(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.search_std).collect()
    }
}

/// Observed value, out-of-fold prediction and residual per sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualTable {
    pub y_true: Array1<f64>,
    pub y_pred: Array1<f64>,
    /// `y_true - y_pred`
    pub residuals: Array1<f64>,
}

impl ResidualTable {
    pub fn new(y_true: Array1<f64>, y_pred: Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(NcvError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        let residuals = &y_true - &y_pred;
        Ok(Self {
            y_true,
            y_pred,
            residuals,
        })
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    pub fn empirical_vs_predicted(&self) -> EmpiricalSummary {
        empirical_vs_predicted(&self.y_true, &self.y_pred)
    }
}

/// Outcome of [`NestedEvaluator::evaluate`]
#[derive(Debug, Clone)]
pub struct Evaluation<F> {
    pub outer: OuterScores<F>,
    pub residuals: ResidualTable,
}

/// Input bundle for [`NestedEvaluator::partial_dependence`]
#[derive(Debug)]
pub struct PartialDependenceRequest<'a, M> {
    pub model: &'a M,
    /// Rows the dependence is averaged over; incomplete rows are dropped
    pub data: &'a Dataset,
    pub target: &'a str,
    pub feature: &'a str,
    /// Min-max normalize the features first
    pub scale: bool,
}

/// Drives the outer loop of nested cross-validation on one dataset.
///
/// The feature matrix is min-max scaled once up front; every operation
/// (outer folds, residuals, importances, coefficients) sees that same
/// scaled matrix.
#[derive(Debug, Clone)]
pub struct NestedEvaluator {
    feature_names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
    plan: CvPlan,
    metrics: MetricRegistry,
    seed: u64,
}

impl NestedEvaluator {
    pub fn new(dataset: &Dataset, plan: CvPlan, metrics: MetricRegistry) -> Result<Self> {
        if dataset.n_rows() < plan.n_splits {
            return Err(NcvError::DataError(format!(
                "{} usable rows cannot be split into {} folds",
                dataset.n_rows(),
                plan.n_splits
            )));
        }
        if dataset.y().iter().any(|v| !v.is_finite()) {
            return Err(NcvError::DataError(format!(
                "target '{}' still contains missing values",
                dataset.target_name()
            )));
        }

        let x = MinMaxScaler::new().fit_transform(dataset.x())?;

        Ok(Self {
            feature_names: dataset.feature_names().to_vec(),
            x,
            y: dataset.y().clone(),
            plan,
            metrics,
            seed: plan.seed,
        })
    }

    /// Seed for the permutation importance shuffles (defaults to the plan seed)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// The scaled feature matrix
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn plan(&self) -> &CvPlan {
        &self.plan
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    /// Outer-loop scores plus the residual table.
    ///
    /// Any failing fold aborts the whole evaluation.
    pub fn evaluate<R: Regressor>(&self, search: &RandomizedSearch<R>) -> Result<Evaluation<R::Fitted>> {
        let outer = self.outer_scores(search)?;
        let residuals = self.calc_residuals(search)?;
        Ok(Evaluation { outer, residuals })
    }

    /// Tune, refit and score on every repeated k-fold split
    pub fn outer_scores<R: Regressor>(&self, search: &RandomizedSearch<R>) -> Result<OuterScores<R::Fitted>> {
        let splits = self.plan.outer().split(self.n_rows())?;
        let k = self.plan.n_splits;
        let model_name = search.estimator().name();

        let folds = splits
            .par_iter()
            .map(|split| -> Result<OuterFold<R::Fitted>> {
                let x_train = self.x.select(Axis(0), &split.train_indices);
                let y_train = self.y.select(Axis(0), &split.train_indices);
                let x_test = self.x.select(Axis(0), &split.test_indices);
                let y_test = self.y.select(Axis(0), &split.test_indices);

                let result = search.fit(&x_train, &y_train)?;
                let pred = result.best_estimator.predict(&x_test)?;
                let scores: BTreeMap<Metric, f64> = self.metrics.score_all(&y_test, &pred).into_iter().collect();

                info!(
                    model = %model_name,
                    fold = split.fold_idx,
                    params = %format_params(&result.best_params),
                    "Best hyperparameters of outer fold"
                );

                Ok(OuterFold {
                    index: split.fold_idx,
                    repeat: split.fold_idx / k,
                    best_params: result.best_params,
                    search_score: result.best_score,
                    search_std: result.best_std,
                    scores,
                    n_test: split.test_indices.len(),
                    train_indices: split.train_indices.clone(),
                    estimator: result.best_estimator,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outer = OuterScores::new(self.metrics.metrics().to_vec(), folds);

        if self.metrics.contains(Metric::MAE) {
            let mae = CVResults::from_scores(outer.values(Metric::MAE)?);
            info!(
                model = %model_name,
                folds = mae.n_folds,
                mae_mean = mae.mean_score,
                mae_std = mae.std_score,
                "Model performance measured in MAE on outer folds"
            );
        }
        Ok(outer)
    }

    /// One out-of-fold prediction per sample from an unshuffled k-fold pass
    pub fn calc_residuals<R: Regressor>(&self, search: &RandomizedSearch<R>) -> Result<ResidualTable> {
        let n = self.n_rows();
        let splits = self.plan.residual().split(n)?;

        let parts = splits
            .par_iter()
            .map(|split| -> Result<(Vec<usize>, Array1<f64>)> {
                let x_train = self.x.select(Axis(0), &split.train_indices);
                let y_train = self.y.select(Axis(0), &split.train_indices);
                let x_test = self.x.select(Axis(0), &split.test_indices);

                let result = search.fit(&x_train, &y_train)?;
                let pred = result.best_estimator.predict(&x_test)?;
                Ok((split.test_indices.clone(), pred))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut y_pred = Array1::from_elem(n, f64::NAN);
        for (indices, pred) in parts {
            for (&i, p) in indices.iter().zip(pred.iter()) {
                y_pred[i] = *p;
            }
        }
        if y_pred.iter().any(|v| v.is_nan()) {
            return Err(NcvError::ComputationError(
                "residual pass left samples without an out-of-fold prediction".to_string(),
            ));
        }

        debug!(rows = n, "Built residual table");
        ResidualTable::new(self.y.clone(), y_pred)
    }

    /// Pick the outer fold whose `metric` score is highest
    pub fn select_final<F>(&self, outer: &OuterScores<F>, metric: Metric, tie_break: TieBreak) -> Result<Selection> {
        select_final(outer, metric, tie_break)
    }

    /// Permutation importance of a fitted model on the scaled matrix, as
    /// the drop of the `metric` scorer
    pub fn permutation_importance<M: FittedRegressor>(
        &self,
        model: &M,
        n_repeats: usize,
        metric: Metric,
    ) -> Result<ImportanceResult> {
        if n_repeats == 0 {
            return Err(NcvError::ConfigError("permutation repeats must be at least 1".to_string()));
        }
        PermutationImportance::new(|x: &Array2<f64>| model.predict(x))
            .with_n_repeats(n_repeats)
            .with_seed(self.seed)
            .with_feature_names(self.feature_names.clone())
            .compute_with_scorer(&self.x, &self.y, |t, p| metric.score(t, p))
    }

    /// Coefficient table of a linear model; `None` for other families.
    ///
    /// `rows` are the rows `model` was fit on. Standard errors, t and p
    /// values come from the design of exactly those rows.
    pub fn regression_coefficients<M: FittedRegressor>(
        &self,
        model: &M,
        rows: &[usize],
        significance: CoefficientSignificance,
    ) -> Result<Option<CoefficientTable>> {
        if let Some(&bad) = rows.iter().find(|&&i| i >= self.n_rows()) {
            return Err(NcvError::ShapeError {
                expected: format!("row index below {}", self.n_rows()),
                actual: bad.to_string(),
            });
        }
        let x = self.x.select(Axis(0), rows);
        let y = self.y.select(Axis(0), rows);

        match model.linear_terms(&x) {
            None => Ok(None),
            Some(terms) => {
                let terms = terms?;
                coefficient_table(&terms, &y, &self.feature_names, significance).map(Some)
            }
        }
    }

    /// Average-kind partial dependence of one feature, with a grid as fine
    /// as the number of complete rows
    pub fn partial_dependence<M: FittedRegressor>(
        &self,
        request: &PartialDependenceRequest<'_, M>,
    ) -> Result<PDPResult> {
        let data = request.data;
        if data.target_name() != request.target {
            return Err(NcvError::ConfigError(format!(
                "partial dependence requested for target '{}' on data with target '{}'",
                request.target,
                data.target_name()
            )));
        }
        if data.feature_names() != self.feature_names.as_slice() {
            return Err(NcvError::ConfigError(
                "feature columns of the data do not match the evaluated model".to_string(),
            ));
        }

        let (complete, dropped) = data.drop_incomplete_rows()?;
        debug!(
            feature = request.feature,
            dropped,
            rows = complete.n_rows(),
            "Dropped incomplete rows for partial dependence"
        );

        let feature_index = complete.feature_index(request.feature)?;
        let x = if request.scale {
            MinMaxScaler::new().fit_transform(complete.x())?
        } else {
            complete.x().clone()
        };

        PartialDependence::new(|x: &Array2<f64>| request.model.predict(x))
            .with_grid_resolution(complete.n_rows())
            .with_feature_names(complete.feature_names().to_vec())
            .compute(&x, feature_index)
    }
}
