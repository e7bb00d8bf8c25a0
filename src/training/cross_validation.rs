//! Cross-validation splitters and the nested cross-validation plan

use crate::error::{NcvError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// K-Fold repeated with a different shuffle each time
    RepeatedKFold { n_splits: usize, n_repeats: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    /// Total number of splits produced
    pub fn n_splits(&self) -> usize {
        match self.strategy {
            CVStrategy::KFold { n_splits, .. } => n_splits,
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => n_splits * n_repeats,
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle, self.random_state)
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                self.repeated_k_fold_split(n_samples, *n_splits, *n_repeats)
            }
        }
    }

    fn k_fold_split(
        &self,
        n_samples: usize,
        n_splits: usize,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<Vec<CVSplit>> {
        if n_splits < 2 {
            return Err(NcvError::ValidationError(
                "n_splits must be at least 2".to_string()
            ));
        }
        if n_samples < n_splits {
            return Err(NcvError::ValidationError(
                format!("n_samples ({}) must be >= n_splits ({})", n_samples, n_splits)
            ));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();

        if shuffle {
            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }

        // First n_samples % n_splits folds get one extra sample
        let fold_sizes: Vec<usize> = (0..n_splits)
            .map(|i| {
                let base = n_samples / n_splits;
                let remainder = n_samples % n_splits;
                if i < remainder { base + 1 } else { base }
            })
            .collect();

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for (fold_idx, &fold_size) in fold_sizes.iter().enumerate() {
            let test_indices: Vec<usize> = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });

            current += fold_size;
        }

        Ok(splits)
    }

    fn repeated_k_fold_split(&self, n_samples: usize, n_splits: usize, n_repeats: usize) -> Result<Vec<CVSplit>> {
        if n_repeats == 0 {
            return Err(NcvError::ValidationError(
                "n_repeats must be at least 1".to_string()
            ));
        }
        let mut all_splits = Vec::with_capacity(n_splits * n_repeats);

        for repeat in 0..n_repeats {
            let seed = self.random_state.map(|s| s.wrapping_add(repeat as u64));
            let mut splits = self.k_fold_split(n_samples, n_splits, true, seed)?;

            // Fold indices are unique across repeats
            for split in &mut splits {
                split.fold_idx += repeat * n_splits;
            }

            all_splits.extend(splits);
        }

        Ok(all_splits)
    }
}

/// Fixed (k, repeats) partitioning shared by both loops of nested
/// cross-validation.
///
/// * the outer loop uses repeated k-fold (`k * repeats` splits),
/// * the inner hyperparameter search uses plain shuffled k-fold,
/// * the residual pass uses unshuffled k-fold so that every sample gets
///   exactly one out-of-fold prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvPlan {
    pub n_splits: usize,
    pub n_repeats: usize,
    pub seed: u64,
}

impl CvPlan {
    pub fn new(n_splits: usize, n_repeats: usize, seed: u64) -> Result<Self> {
        if n_splits < 2 {
            return Err(NcvError::ConfigError(format!(
                "k must be at least 2, got {}",
                n_splits
            )));
        }
        if n_repeats == 0 {
            return Err(NcvError::ConfigError("repeats must be at least 1".to_string()));
        }
        Ok(Self {
            n_splits,
            n_repeats,
            seed,
        })
    }

    /// Number of outer folds, `k * repeats`
    pub fn n_outer_folds(&self) -> usize {
        self.n_splits * self.n_repeats
    }

    pub fn outer(&self) -> CrossValidator {
        CrossValidator::new(CVStrategy::RepeatedKFold {
            n_splits: self.n_splits,
            n_repeats: self.n_repeats,
        })
        .with_random_state(self.seed)
    }

    pub fn inner(&self) -> CrossValidator {
        CrossValidator::new(CVStrategy::KFold {
            n_splits: self.n_splits,
            shuffle: true,
        })
        .with_random_state(self.seed)
    }

    pub fn residual(&self) -> CrossValidator {
        CrossValidator::new(CVStrategy::KFold {
            n_splits: self.n_splits,
            shuffle: false,
        })
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores (population)
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);

        // Each test set should have 20 samples
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_uneven_folds() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: false });
        let sizes: Vec<usize> = cv.split(10).unwrap().iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(3).is_err());
    }

    #[test]
    fn test_repeated_k_fold() {
        let cv = CrossValidator::new(CVStrategy::RepeatedKFold { n_splits: 5, n_repeats: 3 })
            .with_random_state(42);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 15); // 5 * 3
        assert_eq!(splits.last().unwrap().fold_idx, 14);

        // Each repeat is a full partition
        for repeat in splits.chunks(5) {
            let mut all_test: Vec<usize> = repeat.iter().flat_map(|s| s.test_indices.clone()).collect();
            all_test.sort();
            assert_eq!(all_test, (0..100).collect::<Vec<_>>());
        }

        // Repeats are shuffled differently
        assert_ne!(splits[0].test_indices, splits[5].test_indices);
    }

    #[test]
    fn test_seeded_splits_are_reproducible() {
        let a = CvPlan::new(4, 2, 7).unwrap().outer().split(40).unwrap();
        let b = CvPlan::new(4, 2, 7).unwrap().outer().split(40).unwrap();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_plan() {
        let plan = CvPlan::new(3, 2, 42).unwrap();
        assert_eq!(plan.n_outer_folds(), 6);
        assert_eq!(plan.outer().split(30).unwrap().len(), 6);
        assert_eq!(plan.inner().split(30).unwrap().len(), 3);

        let residual = plan.residual().split(30).unwrap();
        assert_eq!(residual[0].test_indices, (0..10).collect::<Vec<_>>());

        assert!(CvPlan::new(1, 2, 42).is_err());
        assert!(CvPlan::new(3, 0, 42).is_err());
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![1.0, 2.0, 3.0]);
        assert_eq!(results.mean_score, 2.0);
        assert!((results.std_score - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
