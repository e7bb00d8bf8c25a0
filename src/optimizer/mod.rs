//! Hyperparameter search
//!
//! - Search spaces loaded from JSON (choices, uniform, log-uniform, integer ranges)
//! - Randomized search with refit, scored on inner cross-validation folds

mod random_search;
mod search_space;

pub use random_search::{CandidateResult, RandomizedSearch, SearchResult, DEFAULT_N_ITER};
pub use search_space::{format_params, Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
