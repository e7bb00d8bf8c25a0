//! Cross-model feature importance ranking

use crate::error::{NcvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a model family's outer-fold MAE becomes its importance weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceWeighting {
    /// `|MAE|`: worse models weigh more
    Literal,
    /// `1 / |MAE|`: better models weigh more
    #[default]
    InverseError,
}

impl ImportanceWeighting {
    pub fn weight(&self, mean_mae: f64) -> Result<f64> {
        let mae = mean_mae.abs();
        if !mae.is_finite() {
            return Err(NcvError::ComputationError(format!(
                "cannot weight importances by MAE {}",
                mean_mae
            )));
        }
        match self {
            ImportanceWeighting::Literal => Ok(mae),
            ImportanceWeighting::InverseError if mae == 0.0 => Err(NcvError::ComputationError(
                "inverse-error weighting is undefined for a zero MAE".to_string(),
            )),
            ImportanceWeighting::InverseError => Ok(1.0 / mae),
        }
    }
}

impl fmt::Display for ImportanceWeighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportanceWeighting::Literal => write!(f, "literal"),
            ImportanceWeighting::InverseError => write!(f, "inverse_error"),
        }
    }
}

/// Mean permutation importances of one model family with its weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyImportance {
    pub family: String,
    pub importances: Vec<f64>,
    pub weight: f64,
}

/// Per-family weighted importances and their sum, ranked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedImportance {
    pub feature_names: Vec<String>,
    pub families: Vec<FamilyImportance>,
    /// `|weight| * importance`, one vector per family in `families` order
    pub weighted: Vec<Vec<f64>>,
    /// Sum over families, in feature order
    pub weighted_sum: Vec<f64>,
}

impl AggregatedImportance {
    /// Feature indices by descending weighted sum; ties keep feature order
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.weighted_sum.len()).collect();
        order.sort_by(|&a, &b| self.weighted_sum[b].total_cmp(&self.weighted_sum[a]));
        order
    }

    /// Feature names by descending weighted sum
    pub fn ranked_features(&self) -> Vec<String> {
        self.ranking()
            .into_iter()
            .map(|i| self.feature_names[i].clone())
            .collect()
    }
}

/// Weighted sum of importance vectors across model families
pub fn aggregate_importances(
    feature_names: &[String],
    families: Vec<FamilyImportance>,
) -> Result<AggregatedImportance> {
    if families.is_empty() {
        return Err(NcvError::ConfigError("no model families to aggregate".to_string()));
    }
    let n = feature_names.len();
    for fam in &families {
        if fam.importances.len() != n {
            return Err(NcvError::ShapeError {
                expected: format!("{} importances", n),
                actual: format!("{} importances for {}", fam.importances.len(), fam.family),
            });
        }
    }

    let weighted: Vec<Vec<f64>> = families
        .iter()
        .map(|fam| fam.importances.iter().map(|v| v * fam.weight.abs()).collect())
        .collect();

    let weighted_sum = (0..n)
        .map(|j| weighted.iter().map(|w| w[j]).sum())
        .collect();

    Ok(AggregatedImportance {
        feature_names: feature_names.to_vec(),
        families,
        weighted,
        weighted_sum,
    })
}
