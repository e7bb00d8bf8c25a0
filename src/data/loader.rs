//! CSV input and output

use crate::error::{NcvError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Candidate predictor file of one (area, year, target) combination:
/// `<dir>/<aoi>/df_<year>_<target>_commercial_<floodtype>.csv`, where the
/// flood type is the last `_`-separated token of the area label.
pub fn dataset_path(dataset_dir: &Path, aoi_and_floodtype: &str, year: &str, target: &str) -> PathBuf {
    let flood_type = aoi_and_floodtype
        .rsplit('_')
        .next()
        .unwrap_or(aoi_and_floodtype);
    dataset_dir
        .join(aoi_and_floodtype)
        .join(format!("df_{}_{}_commercial_{}.csv", year, target, flood_type))
}

/// Read a CSV file with a header row
pub fn load_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| NcvError::DataError(format!("{}: {}", path.display(), e)))?;

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| NcvError::DataError(e.to_string()))
}

/// Write a data frame as CSV, creating parent directories
pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| NcvError::DataError(e.to_string()))
}
