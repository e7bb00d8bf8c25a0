//! Floodloss NCV - nested cross-validation of flood-loss regression models
//!
//! Compares elastic net, random forest, XGBoost-style boosting and bagging
//! ensembles on relative-loss targets and explains the selected models.
//!
//! # Modules
//!
//! ## Core
//! - [`metrics`] - Regression metrics and the scorer registry
//! - [`data`] - Candidate-predictor datasets and CSV IO
//! - [`preprocessing`] - Min-max scaling
//! - [`training`] - Estimators, pipelines and cross-validation splitters
//! - [`optimizer`] - Randomized hyperparameter search
//!
//! ## Evaluation
//! - [`evaluation`] - Nested cross-validation, final-model selection, coefficients
//! - [`explainability`] - Permutation importance, partial dependence, importance aggregation
//!
//! ## Orchestration
//! - [`experiment`] - Configuration, driver and report writing
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod metrics;
pub mod data;
pub mod preprocessing;
pub mod training;
pub mod optimizer;

// Evaluation
pub mod evaluation;
pub mod explainability;

// Orchestration
pub mod experiment;
pub mod cli;

pub use error::{NcvError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::data::{Dataset, MissingValuePolicy};
    pub use crate::error::{NcvError, Result};
    pub use crate::evaluation::{
        select_final, CoefficientSignificance, FinalModel, NestedEvaluator, OuterScores, TieBreak,
    };
    pub use crate::experiment::{Driver, ExperimentConfig, HyperparameterSets, RunSpec};
    pub use crate::explainability::{aggregate_importances, ImportanceWeighting, PermutationImportance};
    pub use crate::metrics::{Metric, MetricRegistry};
    pub use crate::optimizer::{RandomizedSearch, SearchSpace};
    pub use crate::training::{CvPlan, FittedPipeline, FittedRegressor, Pipeline, Regressor};
}
