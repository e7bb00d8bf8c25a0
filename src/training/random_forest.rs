//! Random Forest regressor

use super::decision_tree::RegressionTree;
use super::models::{
    check_n_features, check_training_data, param_bool, param_opt_usize, param_u64, param_usize,
    unknown_param, FittedRegressor, Regressor,
};
use crate::error::{NcvError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    /// Parse `"sqrt"`, `"log2"`, a fraction in (0, 1], an integer count or `null` (all)
    pub fn from_param(value: &ParameterValue) -> Result<Self> {
        let invalid = || NcvError::InvalidParameter {
            name: "max_features".to_string(),
            value: value.to_string(),
            reason: "expected sqrt, log2, a fraction, a count or null".to_string(),
        };
        match value {
            ParameterValue::Null => Ok(MaxFeatures::All),
            ParameterValue::String(s) => match s.as_str() {
                "sqrt" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                _ => Err(invalid()),
            },
            ParameterValue::Int(n) if *n >= 1 => Ok(MaxFeatures::Fixed(*n as usize)),
            ParameterValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            _ => Err(invalid()),
        }
    }

    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

/// Random Forest regressor: bootstrap-resampled regression trees averaged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn fit_in_place(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y, false)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        self.n_features = n_features;
        let max_features = self.max_features.resolve(n_features);

        // Build trees in parallel, tree i seeded with base_seed + i
        let base_seed = self.random_state.unwrap_or(42);

        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = RegressionTree::new()
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features));
                tree.fit(&x_boot, &y_boot, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<RegressionTree>>>()?;

        self.trees = trees;
        self.compute_feature_importances();
        Ok(())
    }

    fn compute_feature_importances(&mut self) {
        let mut total = Array1::<f64>::zeros(self.n_features);
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            total += imp;
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        self.feature_importances = Some(total);
    }

    /// Impurity-based feature importances, normalized to sum to one
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    type Fitted = RandomForestRegressor;

    fn name(&self) -> String {
        "RandomForestRegressor".to_string()
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        match name {
            "n_estimators" => self.n_estimators = param_usize(name, value)?,
            "max_depth" => self.max_depth = param_opt_usize(name, value)?,
            "min_samples_split" => self.min_samples_split = param_usize(name, value)?.max(2),
            "min_samples_leaf" => self.min_samples_leaf = param_usize(name, value)?,
            "max_features" => self.max_features = MaxFeatures::from_param(value)?,
            "bootstrap" => self.bootstrap = param_bool(name, value)?,
            "random_state" => self.random_state = Some(param_u64(name, value)?),
            _ => return Err(unknown_param("RandomForestRegressor", name)),
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<RandomForestRegressor> {
        let mut model = self.clone();
        model.fit_in_place(x, y)?;
        Ok(model)
    }
}

impl FittedRegressor for RandomForestRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(NcvError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<Array1<f64>>>>()?;

        let mut mean = Array1::<f64>::zeros(x.nrows());
        for preds in &all_predictions {
            mean += preds;
        }
        Ok(mean / all_predictions.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let rf = RandomForestRegressor::new(10).with_random_state(42).fit(&x, &y).unwrap();
        let predictions = rf.predict(&x).unwrap();

        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 2.0, "MSE too high: {}", mse);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let x = Array2::from_shape_fn((30, 3), |(i, j)| ((i * 7 + j * 3) % 13) as f64);
        let y = x.column(0).to_owned() + x.column(2).mapv(|v| v * 0.5);
        let config = RandomForestRegressor::new(8)
            .with_random_state(3)
            .with_max_features(MaxFeatures::Sqrt);
        let a = config.fit(&x, &y).unwrap().predict(&x).unwrap();
        let b = config.fit(&x, &y).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let rf = RandomForestRegressor::new(10).with_random_state(42).fit(&x, &y).unwrap();
        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
    }

    #[test]
    fn test_max_features() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10), 5);
        assert_eq!(MaxFeatures::Fixed(20).resolve(10), 10);
        assert_eq!(
            MaxFeatures::from_param(&ParameterValue::String("sqrt".into())).unwrap(),
            MaxFeatures::Sqrt
        );
        assert_eq!(MaxFeatures::from_param(&ParameterValue::Null).unwrap(), MaxFeatures::All);
        assert!(MaxFeatures::from_param(&ParameterValue::Float(1.5)).is_err());
    }

    #[test]
    fn test_set_params() {
        let mut rf = RandomForestRegressor::default();
        rf.set_param("max_depth", &ParameterValue::Null).unwrap();
        rf.set_param("n_estimators", &ParameterValue::Int(50)).unwrap();
        assert_eq!(rf.max_depth, None);
        assert_eq!(rf.n_estimators, 50);
        assert!(matches!(
            rf.set_param("learning_rate", &ParameterValue::Float(0.1)),
            Err(NcvError::ConfigError(_))
        ));
    }

    #[test]
    fn test_rejects_missing_values() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        assert!(RandomForestRegressor::new(3).fit(&x, &y).is_err());
    }
}
