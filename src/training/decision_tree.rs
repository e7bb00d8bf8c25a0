//! Regression tree (CART, squared-error criterion)

use crate::error::{NcvError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

/// Regression tree grown greedily on variance reduction.
///
/// `max_features` limits the features examined at each node; a fresh random
/// subset is drawn per node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features to consider per split, all when `None`
    pub max_features: Option<usize>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fit the tree; `rng` drives the per-node feature subsets
    pub fn fit<R: Rng>(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut R) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(NcvError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(NcvError::DataError("cannot grow a tree on zero rows".to_string()));
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut R,
    ) -> TreeNode {
        let n_samples = indices.len();
        let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples as f64;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_constant(y, indices);

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let features = self.candidate_features(rng);
        let best = match self.find_best_split(x, y, indices, &features) {
            Some(best) => best,
            None => return TreeNode::Leaf { value, n_samples },
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            gain: best.gain,
        }
    }

    fn candidate_features<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut features = index::sample(rng, self.n_features, k.max(1)).into_vec();
                features.sort_unstable();
                features
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best variance-reducing split among `features`, scanning each feature's
    /// sorted values once with running sums.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_impurity = total_sq / n - (total_sum / n).powi(2);
        let min_leaf = self.min_samples_leaf;

        let results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<SplitCandidate> = None;
                let mut left_sum = 0.0;
                let mut left_sq = 0.0;

                for pos in 0..pairs.len() - 1 {
                    let (xv, yv) = pairs[pos];
                    left_sum += yv;
                    left_sq += yv * yv;

                    let next = pairs[pos + 1].0;
                    if next <= xv {
                        continue;
                    }
                    let left_count = pos + 1;
                    let right_count = pairs.len() - left_count;
                    if left_count < min_leaf || right_count < min_leaf {
                        continue;
                    }

                    let (lc, rc) = (left_count as f64, right_count as f64);
                    let right_sum = total_sum - left_sum;
                    let right_sq = total_sq - left_sq;
                    let left_imp = left_sq / lc - (left_sum / lc).powi(2);
                    let right_imp = right_sq / rc - (right_sum / rc).powi(2);
                    let gain = parent_impurity - (lc * left_imp + rc * right_imp) / n;

                    if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: (xv + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Strictly greater keeps the lowest feature index on ties
        results.into_iter().flatten().fold(None, |acc: Option<SplitCandidate>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(NcvError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(NcvError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value, .. } => break *value,
                        TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                            node = if row[*feature_idx] <= *threshold { left.as_ref() } else { right.as_ref() };
                        }
                    }
                }
            })
            .collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

fn is_constant(y: &Array1<f64>, indices: &[usize]) -> bool {
    let first = y[indices[0]];
    indices.iter().all(|&i| (y[i] - first).abs() < 1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng).unwrap();

        // Fully grown tree interpolates the training data
        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(tree.get_n_leaves(), 5);
    }

    #[test]
    fn test_step_function() {
        let x = array![[0.1], [0.2], [0.3], [0.7], [0.8], [0.9]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng).unwrap();

        assert_eq!(tree.get_depth(), 2);
        let pred = tree.predict(&array![[0.45], [0.55]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 0.5, 1.0, 3.0];

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = RegressionTree::new().with_max_depth(Some(1));
        tree.fit(&x, &y, &mut rng).unwrap();

        assert!(tree.get_depth() <= 2);
        assert!(tree.get_n_leaves() <= 2);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0.0, 5.0, 0.0, 5.0, 0.0, 5.0];

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = RegressionTree::new().with_min_samples_leaf(3);
        tree.fit(&x, &y, &mut rng).unwrap();
        assert!(tree.get_n_leaves() <= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = RegressionTree::new();
        tree.fit(&x, &y, &mut rng).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_unfitted_predict() {
        let tree = RegressionTree::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(NcvError::ModelNotFitted)));
    }
}
