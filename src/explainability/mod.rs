//! Model explainability module
//!
//! Provides model interpretation methods shared by every model family:
//! - Permutation feature importance
//! - Partial dependence (average kind)
//! - Weighted cross-model importance ranking

mod aggregate;
mod importance;
mod pdp;

pub use aggregate::{aggregate_importances, AggregatedImportance, FamilyImportance, ImportanceWeighting};
pub use importance::{ImportanceResult, PermutationImportance};
pub use pdp::{PDPResult, PartialDependence};
