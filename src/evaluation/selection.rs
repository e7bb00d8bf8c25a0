//! Final-model selection among the outer-fold estimators

use super::nested_cv::OuterScores;
use crate::error::{NcvError, Result};
use crate::metrics::Metric;
use crate::optimizer::{format_params, TrialParams};
use crate::training::{FittedRegressor, Regressor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// How folds sharing the best score are resolved.
///
/// Ties are exact floating-point equality; scores differing by rounding
/// noise alone are not treated as tied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The first fold with the best score
    #[default]
    FirstOccurrence,
    /// The first fold, with every tied fold reported
    ReportAll,
    /// Among tied folds, the one whose inner search had the smallest
    /// score spread for its selected candidate
    LowestSearchVariance,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::FirstOccurrence => write!(f, "first_occurrence"),
            TieBreak::ReportAll => write!(f, "report_all"),
            TieBreak::LowestSearchVariance => write!(f, "lowest_search_variance"),
        }
    }
}

/// The selected outer fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub index: usize,
    pub metric: Metric,
    /// Scorer value of the selected fold
    pub score: f64,
    /// Folds sharing the best score; only the selected one under
    /// `FirstOccurrence`
    pub tied: Vec<usize>,
}

impl Selection {
    /// Raw metric value of the selected fold
    pub fn value(&self) -> f64 {
        self.metric.value_from_score(self.score)
    }
}

/// Index of the outer fold with the highest `metric` score
pub fn select_final<F>(outer: &OuterScores<F>, metric: Metric, tie_break: TieBreak) -> Result<Selection> {
    let scores = outer.scores(metric)?;
    let best = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(None, |acc: Option<f64>, s| match acc {
            Some(b) if b >= s => Some(b),
            _ => Some(s),
        })
        .ok_or_else(|| NcvError::ComputationError(format!("no finite outer-fold {} score", metric)))?;

    let tied: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] == best).collect();
    let first = tied[0];

    let index = match tie_break {
        TieBreak::FirstOccurrence | TieBreak::ReportAll => first,
        TieBreak::LowestSearchVariance => {
            let stds = outer.search_stds();
            tied.iter()
                .copied()
                .min_by(|&a, &b| stds[a].total_cmp(&stds[b]))
                .unwrap_or(first)
        }
    };

    if tied.len() > 1 {
        match tie_break {
            TieBreak::FirstOccurrence => {}
            _ => warn!(metric = %metric, folds = ?tied, selected = index, "Outer folds tied for best score"),
        }
    }

    let tied = match tie_break {
        TieBreak::FirstOccurrence => vec![index],
        _ => tied,
    };

    Ok(Selection {
        index,
        metric,
        score: best,
        tied,
    })
}

/// Predictions of the final model on the rows it was refit on.
///
/// These are in-sample values for importance and partial-dependence work;
/// the outer-fold scores remain the generalization estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InSamplePredictions {
    pub y_pred: Array1<f64>,
}

/// The representative estimator of one model family
#[derive(Debug, Clone)]
pub struct FinalModel<F> {
    pub selection: Selection,
    pub params: TrialParams,
    pub estimator: F,
    /// Rows of the evaluator matrix `estimator` was fit on
    pub train_indices: Vec<usize>,
    /// Whether `estimator` was refit on every available row
    pub refit_on_full_data: bool,
}

impl<F: FittedRegressor + Clone> FinalModel<F> {
    /// Extract the selected fold's estimator
    pub fn from_outer(outer: &OuterScores<F>, metric: Metric, tie_break: TieBreak) -> Result<Self> {
        let selection = select_final(outer, metric, tie_break)?;
        let fold = outer.fold(selection.index).ok_or_else(|| {
            NcvError::ComputationError(format!("selected fold {} does not exist", selection.index))
        })?;

        info!(
            fold = selection.index,
            metric = %metric,
            value = selection.value(),
            params = %format_params(&fold.best_params),
            "Selected final model"
        );

        Ok(Self {
            params: fold.best_params.clone(),
            estimator: fold.estimator.clone(),
            train_indices: fold.train_indices.clone(),
            selection,
            refit_on_full_data: false,
        })
    }

    /// Refit the selected hyperparameters on all rows
    pub fn refit_full<R>(&self, candidate: &R, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self>
    where
        R: Regressor<Fitted = F>,
    {
        let estimator = candidate.with_params(&self.params)?.fit(x, y)?;
        Ok(Self {
            selection: self.selection.clone(),
            params: self.params.clone(),
            estimator,
            train_indices: (0..x.nrows()).collect(),
            refit_on_full_data: true,
        })
    }

    pub fn predict_full(&self, x: &Array2<f64>) -> Result<InSamplePredictions> {
        Ok(InSamplePredictions {
            y_pred: self.estimator.predict(x)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::OuterFold;
    use crate::optimizer::ParameterValue;
    use crate::training::ElasticNet;
    use ndarray::array;
    use std::collections::BTreeMap;

    fn outer(maes: &[f64], stds: &[f64]) -> OuterScores<usize> {
        let folds = maes
            .iter()
            .zip(stds.iter())
            .enumerate()
            .map(|(i, (&mae, &std))| {
                let mut params = TrialParams::new();
                params.insert("alpha".to_string(), ParameterValue::Float(i as f64));
                OuterFold {
                    index: i,
                    repeat: 0,
                    best_params: params,
                    search_score: -mae,
                    search_std: std,
                    scores: BTreeMap::from([(Metric::MAE, -mae)]),
                    n_test: 10,
                    train_indices: (0..20).collect(),
                    estimator: i,
                }
            })
            .collect();
        OuterScores::new(vec![Metric::MAE], folds)
    }

    #[test]
    fn test_smallest_error_wins() {
        let scores = outer(&[0.3, 0.1, 0.2], &[0.0; 3]);
        let selection = select_final(&scores, Metric::MAE, TieBreak::FirstOccurrence).unwrap();
        assert_eq!(selection.index, 1);
        assert!((selection.value() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_tie_break_modes() {
        let scores = outer(&[0.2, 0.1, 0.3, 0.1], &[0.5, 0.4, 0.1, 0.2]);

        let first = select_final(&scores, Metric::MAE, TieBreak::FirstOccurrence).unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.tied, vec![1]);

        let all = select_final(&scores, Metric::MAE, TieBreak::ReportAll).unwrap();
        assert_eq!(all.index, 1);
        assert_eq!(all.tied, vec![1, 3]);

        let stable = select_final(&scores, Metric::MAE, TieBreak::LowestSearchVariance).unwrap();
        assert_eq!(stable.index, 3);
    }

    #[test]
    fn test_non_finite_scores() {
        let scores = outer(&[f64::NAN, 0.4], &[0.0; 2]);
        assert_eq!(select_final(&scores, Metric::MAE, TieBreak::default()).unwrap().index, 1);

        let scores = outer(&[f64::NAN], &[0.0]);
        assert!(select_final(&scores, Metric::MAE, TieBreak::default()).is_err());
        assert!(select_final(&scores, Metric::R2, TieBreak::default()).is_err());
    }

    #[test]
    fn test_refit_full() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
        let fold_model = ElasticNet::new(0.5, 0.5).fit(&x, &y).unwrap();

        let mut params = TrialParams::new();
        params.insert("alpha".to_string(), ParameterValue::Float(1e-8));
        let final_model = FinalModel {
            selection: Selection { index: 0, metric: Metric::MAE, score: -0.1, tied: vec![0] },
            params,
            estimator: fold_model,
            train_indices: vec![0, 1, 2],
            refit_on_full_data: false,
        };

        let refit = final_model.refit_full(&ElasticNet::default(), &x, &y).unwrap();
        assert!(refit.refit_on_full_data);
        assert_eq!(refit.train_indices, vec![0, 1, 2, 3, 4]);
        let pred = refit.predict_full(&x).unwrap();
        assert!((pred.y_pred[4] - 9.0).abs() < 1e-3);
        assert_eq!(refit.selection, final_model.selection);
    }
}
