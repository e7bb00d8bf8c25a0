//! XGBoost-style gradient boosting with second-order approximation
//!
//! Key differences from standard gradient boosting:
//! - Uses both gradient (first derivative) and hessian (second derivative) of loss
//! - Regularized leaf weights: w* = -T(G, alpha) / (H + lambda)
//! - Gain-based split scoring: Gain = 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)]
//! - Built-in L1 (alpha) and L2 (lambda) regularization
//! - Minimum child weight constraint
//! - Sparsity-aware splits: missing values follow a learned default direction

use super::models::{
    check_n_features, check_training_data, param_f64, param_non_negative, param_u64, param_usize,
    unknown_param, FittedRegressor, Regressor,
};
use crate::error::{NcvError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

/// A single node in the XGBoost tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        /// Branch taken by missing values
        default_left: bool,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split { feature, threshold, default_left, left, right } => {
                    let v = sample[*feature];
                    let go_left = if v.is_nan() { *default_left } else { v <= *threshold };
                    node = if go_left { left.as_ref() } else { right.as_ref() };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
}

/// Gradient and hessian totals of a set of rows
#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
    n: usize,
}

impl GradStats {
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
        self.n += 1;
    }

    fn sub(self, other: GradStats) -> GradStats {
        GradStats { g: self.g - other.g, h: self.h - other.h, n: self.n - other.n }
    }

    fn merge(self, other: GradStats) -> GradStats {
        GradStats { g: self.g + other.g, h: self.h + other.h, n: self.n + other.n }
    }
}

/// L1 soft-threshold applied to a gradient sum
fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    -threshold_l1(g_sum, alpha) / (h_sum + lambda)
}

/// Structure score of a node, the quantity split gains are differences of
fn node_score(stats: GradStats, config: &XGBoostConfig) -> f64 {
    let g = threshold_l1(stats.g, config.reg_alpha);
    g * g / (stats.h + config.reg_lambda)
}

/// Build an XGBoost tree using exact greedy split finding
fn build_xgb_tree(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: &[usize],
    feature_indices: &[usize],
    depth: usize,
    config: &XGBoostConfig,
) -> XGBNode {
    let mut total = GradStats::default();
    for &i in indices {
        total.add(grad[i], hess[i]);
    }
    let leaf_weight = compute_leaf_weight(total.g, total.h, config.reg_lambda, config.reg_alpha);

    // Stopping conditions
    if depth >= config.max_depth || indices.len() < 2 || total.h < config.min_child_weight {
        return XGBNode::Leaf { weight: leaf_weight };
    }

    // Per-feature search in parallel, reduced in feature order so ties keep
    // the lower feature index
    let candidates: Vec<Option<SplitCandidate>> = feature_indices
        .par_iter()
        .map(|&f| find_best_split_for_feature(x, grad, hess, indices, f, total, config))
        .collect();
    let mut best: Option<SplitCandidate> = None;
    for c in candidates.into_iter().flatten() {
        if best.map_or(true, |b| c.gain > b.gain) {
            best = Some(c);
        }
    }

    match best {
        Some(split) if split.gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices.iter().partition(|&&i| {
                let v = x[[i, split.feature]];
                if v.is_nan() {
                    split.default_left
                } else {
                    v <= split.threshold
                }
            });

            if left_idx.is_empty() || right_idx.is_empty() {
                return XGBNode::Leaf { weight: leaf_weight };
            }

            let left = build_xgb_tree(x, grad, hess, &left_idx, feature_indices, depth + 1, config);
            let right = build_xgb_tree(x, grad, hess, &right_idx, feature_indices, depth + 1, config);

            XGBNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                default_left: split.default_left,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => XGBNode::Leaf { weight: leaf_weight },
    }
}

/// Best split of one feature. Present values are swept in sorted order; at
/// each boundary the rows with a missing value are tried on either side.
fn find_best_split_for_feature(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    total: GradStats,
    config: &XGBoostConfig,
) -> Option<SplitCandidate> {
    let mut present: Vec<usize> = Vec::with_capacity(indices.len());
    let mut missing = GradStats::default();
    for &i in indices {
        if x[[i, feature]].is_nan() {
            missing.add(grad[i], hess[i]);
        } else {
            present.push(i);
        }
    }
    if present.is_empty() {
        return None;
    }
    present.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let parent_score = node_score(total, config);
    let mut left_present = GradStats::default();
    let mut best: Option<SplitCandidate> = None;

    for (pos, &idx) in present.iter().enumerate() {
        left_present.add(grad[idx], hess[idx]);
        let value = x[[idx, feature]];

        let threshold = match present.get(pos + 1) {
            // Skip if next sample has same feature value
            Some(&next) if x[[next, feature]] == value => continue,
            Some(&next) => (value + x[[next, feature]]) / 2.0,
            // All present values left: only useful when missing rows go right
            None if missing.n > 0 => value,
            None => continue,
        };

        for default_left in [false, true] {
            let left = if default_left { left_present.merge(missing) } else { left_present };
            let right = total.sub(left);

            if left.n == 0 || right.n == 0 {
                continue;
            }
            // Min child weight check
            if left.h < config.min_child_weight || right.h < config.min_child_weight {
                continue;
            }

            let gain = 0.5 * (node_score(left, config) + node_score(right, config) - parent_score);
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate { feature, threshold, default_left, gain });
            }
        }
    }

    best
}

// ─── XGBoost Regressor ─────────────────────────────────────────────────────

/// XGBoost Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    pub config: XGBoostConfig,
    trees: Vec<XGBNode>,
    base_score: f64,
    n_features: usize,
}

impl Default for XGBoostRegressor {
    fn default() -> Self {
        Self::new(XGBoostConfig::default())
    }
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    fn fit_in_place(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y, true)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;

        // Base prediction = mean(y)
        self.base_score = y.mean().unwrap_or(0.0);
        let mut preds = Array1::from_elem(n_samples, self.base_score);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();

        for _ in 0..self.config.n_estimators {
            // Squared error: grad = pred - y, hess = 1.0
            let grad: Array1<f64> = &preds - y;
            let hess = Array1::from_elem(n_samples, 1.0);

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let tree = build_xgb_tree(x, &grad, &hess, &row_indices, &col_indices, 0, &self.config);

            for (i, row) in x.rows().into_iter().enumerate() {
                preds[i] += self.config.learning_rate * tree.predict(row);
            }

            self.trees.push(tree);
        }

        Ok(())
    }

    /// Split-count feature importances, normalized to sum to one
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            count_splits(tree, &mut counts);
        }
        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            for c in counts.iter_mut() {
                *c /= total;
            }
        }
        Some(Array1::from_vec(counts))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn count_splits(node: &XGBNode, counts: &mut [f64]) {
    match node {
        XGBNode::Leaf { .. } => {}
        XGBNode::Split { feature, left, right, .. } => {
            if *feature < counts.len() {
                counts[*feature] += 1.0;
            }
            count_splits(left, counts);
            count_splits(right, counts);
        }
    }
}

impl Regressor for XGBoostRegressor {
    type Fitted = XGBoostRegressor;

    fn name(&self) -> String {
        "XGBRegressor".to_string()
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        let c = &mut self.config;
        match name {
            "n_estimators" => c.n_estimators = param_usize(name, value)?,
            "learning_rate" | "eta" => c.learning_rate = positive_fraction(name, value, false)?,
            "max_depth" => c.max_depth = param_usize(name, value)?,
            "min_child_weight" => c.min_child_weight = param_non_negative(name, value)?,
            "reg_lambda" | "lambda" => c.reg_lambda = param_non_negative(name, value)?,
            "reg_alpha" | "alpha" => c.reg_alpha = param_non_negative(name, value)?,
            "gamma" => c.gamma = param_non_negative(name, value)?,
            "subsample" => c.subsample = positive_fraction(name, value, true)?,
            "colsample_bytree" => c.colsample_bytree = positive_fraction(name, value, true)?,
            "random_state" => c.random_state = Some(param_u64(name, value)?),
            _ => return Err(unknown_param("XGBRegressor", name)),
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<XGBoostRegressor> {
        let mut model = self.clone();
        model.fit_in_place(x, y)?;
        Ok(model)
    }

    fn handles_missing(&self) -> bool {
        true
    }
}

impl FittedRegressor for XGBoostRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(NcvError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;
        let preds: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| {
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|tree| self.config.learning_rate * tree.predict(row))
                        .sum::<f64>()
            })
            .collect();
        Ok(preds)
    }
}

/// Value in (0, 1], or any positive value when `capped` is false
fn positive_fraction(name: &str, value: &ParameterValue, capped: bool) -> Result<f64> {
    let v = param_f64(name, value)?;
    if v <= 0.0 || (capped && v > 1.0) {
        return Err(NcvError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: if capped { "must lie in (0, 1]" } else { "must be positive" }.to_string(),
        });
    }
    Ok(v)
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = (((n as f64) * ratio).ceil() as usize).max(1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort();
    indices
}
