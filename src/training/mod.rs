//! Model training module
//!
//! Provides the estimators evaluated by the nested cross-validation:
//! - Elastic net (coordinate descent)
//! - Regression trees and Random Forests
//! - XGBoost-style gradient boosting with native missing-value handling
//! - Bagging over any base estimator
//! - Named `[scaler → estimator]` pipelines
//! - Cross-validation splitters

mod models;
pub mod bagging;
pub mod cross_validation;
pub mod decision_tree;
pub mod estimator;
pub mod linear_models;
pub mod pipeline;
pub mod random_forest;
pub mod xgboost;

pub use bagging::{BaggingRegressor, FittedBagging, MaxSamples};
pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator, CvPlan};
pub use decision_tree::{RegressionTree, TreeNode};
pub use estimator::{Estimator, FittedEstimator};
pub use linear_models::ElasticNet;
pub use models::{FittedRegressor, LinearTerms, Regressor};
pub use pipeline::{load_pipeline, write_default_pipelines, FittedPipeline, Pipeline, PIPELINE_NAMES};
pub use random_forest::{MaxFeatures, RandomForestRegressor};
pub use xgboost::{XGBoostConfig, XGBoostRegressor};

pub(crate) use linear_models::matrix_inverse;
