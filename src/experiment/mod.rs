//! Experiment orchestration
//!
//! [`Driver`] runs every (year, target) combination through nested
//! cross-validation for each configured pipeline and hands the results to
//! [`ReportWriter`].

mod config;
mod report;
mod runner;

pub use config::{ExperimentConfig, HyperparameterSets};
pub use report::{coefficient_frame, importance_table, pdp_frame, performance_table, residual_frame, ReportWriter};
pub use runner::{Driver, FamilyReport, FoldRecord, RunSpec, RunSummary, SearchDefinition, TargetReport};
