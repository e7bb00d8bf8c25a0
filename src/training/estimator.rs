//! Closed set of estimators a pipeline can carry

use super::bagging::{BaggingRegressor, FittedBagging};
use super::linear_models::ElasticNet;
use super::models::{FittedRegressor, LinearTerms, Regressor};
use super::random_forest::RandomForestRegressor;
use super::xgboost::XGBoostRegressor;
use crate::error::Result;
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// An unfitted estimator of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    ElasticNet(ElasticNet),
    RandomForest(RandomForestRegressor),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostRegressor),
    Bagging(BaggingRegressor),
}

impl Estimator {
    /// Copy with its random state replaced, where the estimator has one
    pub fn reseeded(&self, seed: u64) -> Estimator {
        let mut estimator = self.clone();
        match &mut estimator {
            Estimator::ElasticNet(_) => {}
            Estimator::RandomForest(rf) => rf.random_state = Some(seed),
            Estimator::XGBoost(xgb) => xgb.config.random_state = Some(seed),
            Estimator::Bagging(bag) => bag.random_state = Some(seed),
        }
        estimator
    }
}

impl Regressor for Estimator {
    type Fitted = FittedEstimator;

    fn name(&self) -> String {
        match self {
            Estimator::ElasticNet(m) => m.name(),
            Estimator::RandomForest(m) => m.name(),
            Estimator::XGBoost(m) => m.name(),
            Estimator::Bagging(m) => m.name(),
        }
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        match self {
            Estimator::ElasticNet(m) => m.set_param(name, value),
            Estimator::RandomForest(m) => m.set_param(name, value),
            Estimator::XGBoost(m) => m.set_param(name, value),
            Estimator::Bagging(m) => m.set_param(name, value),
        }
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FittedEstimator> {
        Ok(match self {
            Estimator::ElasticNet(m) => FittedEstimator::ElasticNet(m.fit(x, y)?),
            Estimator::RandomForest(m) => FittedEstimator::RandomForest(m.fit(x, y)?),
            Estimator::XGBoost(m) => FittedEstimator::XGBoost(m.fit(x, y)?),
            Estimator::Bagging(m) => FittedEstimator::Bagging(m.fit(x, y)?),
        })
    }

    fn handles_missing(&self) -> bool {
        match self {
            Estimator::ElasticNet(m) => m.handles_missing(),
            Estimator::RandomForest(m) => m.handles_missing(),
            Estimator::XGBoost(m) => m.handles_missing(),
            Estimator::Bagging(m) => m.handles_missing(),
        }
    }
}

/// A fitted estimator of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedEstimator {
    ElasticNet(ElasticNet),
    RandomForest(RandomForestRegressor),
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostRegressor),
    Bagging(FittedBagging),
}

impl FittedRegressor for FittedEstimator {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedEstimator::ElasticNet(m) => m.predict(x),
            FittedEstimator::RandomForest(m) => m.predict(x),
            FittedEstimator::XGBoost(m) => m.predict(x),
            FittedEstimator::Bagging(m) => m.predict(x),
        }
    }

    fn linear_terms(&self, x: &Array2<f64>) -> Option<Result<LinearTerms>> {
        match self {
            FittedEstimator::ElasticNet(m) => m.linear_terms(x),
            FittedEstimator::RandomForest(m) => m.linear_terms(x),
            FittedEstimator::XGBoost(m) => m.linear_terms(x),
            FittedEstimator::Bagging(m) => m.linear_terms(x),
        }
    }
}
