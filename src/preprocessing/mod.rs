//! Data preprocessing
//!
//! Min-max scaling shared by the model pipelines, the nested evaluator and
//! the partial-dependence computation.

mod scaler;

pub use scaler::MinMaxScaler;
