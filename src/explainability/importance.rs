//! Permutation feature importance

use crate::error::{NcvError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Result of feature importance computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceResult {
    pub feature_names: Vec<String>,
    /// Mean importance scores
    pub importances_mean: Vec<f64>,
    /// Standard deviation of importance scores
    pub importances_std: Vec<f64>,
    /// Raw importance scores, one row per feature and one column per repeat
    pub importances_raw: Vec<Vec<f64>>,
}

impl ImportanceResult {
    /// Get sorted feature indices by importance (descending)
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indexed: Vec<(usize, f64)> = self
            .importances_mean
            .iter()
            .copied()
            .enumerate()
            .collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        indexed.into_iter().map(|(i, _)| i).collect()
    }

    /// Get top k important features
    pub fn top_k(&self, k: usize) -> Vec<(String, f64)> {
        self.sorted_indices()
            .into_iter()
            .take(k)
            .map(|i| (self.feature_names[i].clone(), self.importances_mean[i]))
            .collect()
    }

    pub fn n_repeats(&self) -> usize {
        self.importances_raw.first().map_or(0, |r| r.len())
    }
}

/// Permutation feature importance calculator.
///
/// Importance is the drop in a greater-is-better score when one column is
/// shuffled. Rows are put into a canonical order (lexicographic on features,
/// then target) before shuffling, so the result does not depend on the order
/// the rows arrive in.
pub struct PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Prediction function
    predict_fn: F,
    /// Number of permutation repeats
    n_repeats: usize,
    seed: u64,
    feature_names: Option<Vec<String>>,
}

impl<F> PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Create new permutation importance calculator
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            n_repeats: 5,
            seed: 0,
            feature_names: None,
        }
    }

    /// Set number of permutation repeats
    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set feature names
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Compute permutation importance with a greater-is-better scorer
    pub fn compute_with_scorer<S>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        scorer: S,
    ) -> Result<ImportanceResult>
    where
        S: Fn(&Array1<f64>, &Array1<f64>) -> f64 + Sync,
    {
        if x.nrows() != y.len() {
            return Err(NcvError::ShapeError {
                expected: format!("{} targets", x.nrows()),
                actual: format!("{} targets", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(NcvError::DataError("no rows to permute".to_string()));
        }
        let n_features = x.ncols();
        let feature_names = match &self.feature_names {
            Some(names) if names.len() == n_features => names.clone(),
            Some(names) => {
                return Err(NcvError::ShapeError {
                    expected: format!("{} feature names", n_features),
                    actual: format!("{} feature names", names.len()),
                })
            }
            None => (0..n_features).map(|j| format!("x{}", j)).collect(),
        };

        let order = canonical_row_order(x, y);
        let x = x.select(Axis(0), &order);
        let y = y.select(Axis(0), &order);

        // Compute baseline score
        let baseline_pred = (self.predict_fn)(&x)?;
        let baseline_score = scorer(&y, &baseline_pred);

        // Each feature gets its own stream so features can be processed in parallel
        let importances_raw = (0..n_features)
            .into_par_iter()
            .map(|feature_idx| -> Result<Vec<f64>> {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(feature_idx as u64));
                let mut x_permuted = x.clone();
                let mut col: Vec<f64> = x.column(feature_idx).to_vec();

                (0..self.n_repeats)
                    .map(|_| -> Result<f64> {
                        col.shuffle(&mut rng);
                        x_permuted
                            .column_mut(feature_idx)
                            .iter_mut()
                            .zip(col.iter())
                            .for_each(|(dst, &v)| *dst = v);

                        let permuted_pred = (self.predict_fn)(&x_permuted)?;
                        Ok(baseline_score - scorer(&y, &permuted_pred))
                    })
                    .collect()
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        // Compute mean and std
        let importances_mean: Vec<f64> = importances_raw
            .iter()
            .map(|scores| scores.iter().sum::<f64>() / scores.len() as f64)
            .collect();

        let importances_std: Vec<f64> = importances_raw
            .iter()
            .zip(importances_mean.iter())
            .map(|(scores, mean)| {
                let variance: f64 =
                    scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
                variance.sqrt()
            })
            .collect();

        Ok(ImportanceResult {
            feature_names,
            importances_mean,
            importances_std,
            importances_raw,
        })
    }
}

/// Row indices sorted lexicographically by feature values, then target
fn canonical_row_order(x: &Array2<f64>, y: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.sort_by(|&a, &b| {
        x.row(a)
            .iter()
            .zip(x.row(b).iter())
            .map(|(va, vb)| va.total_cmp(vb))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| y[a].total_cmp(&y[b]))
    });
    order
}
