//! Nested cross-validation evaluation
//!
//! - [`NestedEvaluator`]: outer loop, residuals, per-model diagnostics
//! - [`select_final`] / [`FinalModel`]: choosing the representative model
//! - [`coefficient_table`]: linear coefficients with OLS significance

mod coefficients;
mod nested_cv;
mod selection;
pub mod stats;

pub use coefficients::{
    coefficient_table, ols_significance, CoefficientRow, CoefficientSignificance, CoefficientTable, OlsStatistic,
};
pub use nested_cv::{
    Evaluation, MetricSummary, NestedEvaluator, OuterFold, OuterScores, PartialDependenceRequest, ResidualTable,
};
pub use selection::{select_final, FinalModel, InSamplePredictions, Selection, TieBreak};
