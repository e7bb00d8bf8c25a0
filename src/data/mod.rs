//! Dataset ingestion and filtering

mod dataset;
mod loader;

pub use dataset::{Dataset, MissingValuePolicy};
pub use loader::{dataset_path, load_csv, save_csv};
