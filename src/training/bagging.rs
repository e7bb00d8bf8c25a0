//! Bagging ensemble over any base estimator

use super::estimator::{Estimator, FittedEstimator};
use super::models::{
    check_n_features, check_training_data, param_bool, param_f64, param_u64, param_usize,
    unknown_param, FittedRegressor, Regressor,
};
use crate::error::{NcvError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, Axis};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Rows drawn for each ensemble member
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxSamples {
    /// Fraction of the training rows, in (0, 1]
    Fraction(f64),
    /// Absolute row count
    Count(usize),
}

impl MaxSamples {
    fn resolve(&self, n_samples: usize) -> usize {
        match *self {
            MaxSamples::Fraction(f) => (n_samples as f64 * f).floor() as usize,
            MaxSamples::Count(n) => n,
        }
        .clamp(1, n_samples.max(1))
    }
}

/// Bagging regressor: copies of a base estimator fit on resampled rows,
/// predictions averaged.
///
/// Hyperparameters of the base estimator are addressed as
/// `estimator__<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggingRegressor {
    pub estimator: Box<Estimator>,
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    /// Draw rows with replacement
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl BaggingRegressor {
    pub fn new(estimator: Estimator) -> Self {
        Self {
            estimator: Box::new(estimator),
            n_estimators: 10,
            max_samples: MaxSamples::Fraction(1.0),
            bootstrap: true,
            random_state: None,
        }
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn sample_rows(&self, rng: &mut ChaCha8Rng, n_samples: usize) -> Vec<usize> {
        let n_draw = self.max_samples.resolve(n_samples);
        if self.bootstrap {
            (0..n_draw).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            let mut rows = index::sample(rng, n_samples, n_draw).into_vec();
            rows.sort_unstable();
            rows
        }
    }
}

impl Regressor for BaggingRegressor {
    type Fitted = FittedBagging;

    fn name(&self) -> String {
        format!("BaggingRegressor({})", self.estimator.name())
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        if let Some(inner) = name.strip_prefix("estimator__") {
            return self.estimator.set_param(inner, value);
        }
        match name {
            "n_estimators" => self.n_estimators = param_usize(name, value)?,
            "max_samples" => {
                self.max_samples = match value {
                    ParameterValue::Int(n) if *n >= 1 => MaxSamples::Count(*n as usize),
                    _ => {
                        let f = param_f64(name, value)?;
                        if f <= 0.0 || f > 1.0 {
                            return Err(NcvError::InvalidParameter {
                                name: name.to_string(),
                                value: value.to_string(),
                                reason: "fraction must lie in (0, 1]".to_string(),
                            });
                        }
                        MaxSamples::Fraction(f)
                    }
                }
            }
            "bootstrap" => self.bootstrap = param_bool(name, value)?,
            "random_state" => self.random_state = Some(param_u64(name, value)?),
            _ => return Err(unknown_param("BaggingRegressor", name)),
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedBagging> {
        check_training_data(x, y, self.estimator.handles_missing())?;
        let n_samples = x.nrows();
        let base_seed = self.random_state.unwrap_or(0);

        let members = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| {
                let member_seed = base_seed.wrapping_add(i as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(member_seed);
                let rows = self.sample_rows(&mut rng, n_samples);
                let x_sample = x.select(Axis(0), &rows);
                let y_sample = y.select(Axis(0), &rows);
                self.estimator.reseeded(member_seed).fit(&x_sample, &y_sample)
            })
            .collect::<Result<Vec<FittedEstimator>>>()?;

        Ok(FittedBagging { members, n_features: x.ncols() })
    }

    fn handles_missing(&self) -> bool {
        self.estimator.handles_missing()
    }
}

/// Fitted bagging ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedBagging {
    members: Vec<FittedEstimator>,
    n_features: usize,
}

impl FittedBagging {
    pub fn members(&self) -> &[FittedEstimator] {
        &self.members
    }
}

impl FittedRegressor for FittedBagging {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.members.is_empty() {
            return Err(NcvError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;
        let mut mean = Array1::<f64>::zeros(x.nrows());
        for member in &self.members {
            mean += &member.predict(x)?;
        }
        Ok(mean / self.members.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ElasticNet;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * (j + 2)) % 7) as f64 / 7.0);
        let y = x.column(0).mapv(|v| 3.0 * v) + 1.0;
        (x, y)
    }

    #[test]
    fn test_bagged_elastic_net() {
        let (x, y) = data();
        let mut bag = BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::new(1e-4, 0.5)))
            .with_random_state(1);
        bag.set_param("n_estimators", &ParameterValue::Int(5)).unwrap();
        let fitted = bag.fit(&x, &y).unwrap();
        assert_eq!(fitted.members().len(), 5);
        assert!(fitted.score(&x, &y).unwrap() > 0.95);
        // No single coefficient vector for an ensemble
        assert!(fitted.linear_terms(&x).is_none());
    }

    #[test]
    fn test_routes_estimator_params() {
        let mut bag = BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::default()));
        bag.set_param("estimator__alpha", &ParameterValue::Float(0.25)).unwrap();
        match bag.estimator.as_ref() {
            Estimator::ElasticNet(en) => assert_eq!(en.alpha, 0.25),
            other => panic!("unexpected base estimator {:?}", other),
        }
        assert!(matches!(
            bag.set_param("alpha", &ParameterValue::Float(0.25)),
            Err(NcvError::ConfigError(_))
        ));
    }

    #[test]
    fn test_max_samples() {
        let mut bag = BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::default()));
        bag.set_param("max_samples", &ParameterValue::Float(0.5)).unwrap();
        assert_eq!(bag.max_samples.resolve(10), 5);
        bag.set_param("max_samples", &ParameterValue::Int(40)).unwrap();
        assert_eq!(bag.max_samples.resolve(10), 10);
        assert!(bag.set_param("max_samples", &ParameterValue::Float(1.5)).is_err());
    }

    #[test]
    fn test_without_replacement_draws_distinct_rows() {
        let mut bag = BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::default()));
        bag.bootstrap = false;
        bag.max_samples = MaxSamples::Fraction(0.5);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let rows = bag.sample_rows(&mut rng, 20);
        assert_eq!(rows.len(), 10);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rejects_missing_for_linear_base() {
        let bag = BaggingRegressor::new(Estimator::ElasticNet(ElasticNet::default()));
        let x = array![[1.0], [f64::NAN]];
        assert!(bag.fit(&x, &array![1.0, 2.0]).is_err());
    }
}
