//! Experiment configuration and hyperparameter sets

use crate::error::{NcvError, Result};
use crate::evaluation::{CoefficientSignificance, TieBreak};
use crate::explainability::ImportanceWeighting;
use crate::metrics::{Metric, MetricRegistry};
use crate::optimizer::{SearchSpace, DEFAULT_N_ITER};
use crate::training::{CvPlan, Pipeline};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Settings of one experiment run, threaded through every component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Seed for fold assignment, candidate sampling, estimators and
    /// permutation shuffles
    pub seed: u64,

    /// Folds per cross-validation pass
    pub k_folds: usize,

    /// Repetitions of the outer k-fold
    pub repeats: usize,

    /// Candidates drawn by the randomized search
    pub n_iter: usize,

    /// Metric optimized by the inner search
    pub tuning_metric: Metric,

    /// Metrics scored on every outer fold
    pub metrics: Vec<Metric>,

    /// Metric the final model is selected by
    pub selection_metric: Metric,

    pub tie_break: TieBreak,

    pub importance_repeats: usize,

    /// Scorer whose drop measures permutation importance
    pub importance_metric: Metric,

    pub importance_weighting: ImportanceWeighting,

    pub coefficient_significance: CoefficientSignificance,

    /// Min-max normalize features before partial dependence
    pub pdp_scale: bool,

    /// Restrict partial dependence to a family's most important features
    pub pdp_top_features: Option<usize>,

    /// Refit the selected hyperparameters on all rows instead of keeping the
    /// outer-fold estimator
    pub refit_final_on_full_data: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            k_folds: 5,
            repeats: 2,
            n_iter: DEFAULT_N_ITER,
            tuning_metric: Metric::MAE,
            metrics: Metric::ALL.to_vec(),
            selection_metric: Metric::MAE,
            tie_break: TieBreak::default(),
            importance_repeats: 5,
            importance_metric: Metric::R2,
            importance_weighting: ImportanceWeighting::default(),
            coefficient_significance: CoefficientSignificance::default(),
            pdp_scale: true,
            pdp_top_features: None,
            refit_final_on_full_data: false,
        }
    }
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cv(mut self, k_folds: usize, repeats: usize) -> Self {
        self.k_folds = k_folds;
        self.repeats = repeats;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_importance_repeats(mut self, repeats: usize) -> Self {
        self.importance_repeats = repeats;
        self
    }

    pub fn with_importance_weighting(mut self, weighting: ImportanceWeighting) -> Self {
        self.importance_weighting = weighting;
        self
    }

    pub fn with_coefficient_significance(mut self, significance: CoefficientSignificance) -> Self {
        self.coefficient_significance = significance;
        self
    }

    pub fn with_pdp_top_features(mut self, n: Option<usize>) -> Self {
        self.pdp_top_features = n;
        self
    }

    pub fn with_refit_final_on_full_data(mut self, refit: bool) -> Self {
        self.refit_final_on_full_data = refit;
        self
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        self.plan()?;
        if self.n_iter == 0 {
            return Err(NcvError::ConfigError("n_iter must be at least 1".to_string()));
        }
        if self.importance_repeats == 0 {
            return Err(NcvError::ConfigError("importance_repeats must be at least 1".to_string()));
        }
        let registry = self.registry()?;
        for metric in [self.selection_metric, Metric::MAE] {
            if !registry.contains(metric) {
                return Err(NcvError::ConfigError(format!(
                    "metric {} must be scored on the outer folds",
                    metric
                )));
            }
        }
        Ok(())
    }

    pub fn plan(&self) -> Result<CvPlan> {
        CvPlan::new(self.k_folds, self.repeats, self.seed)
    }

    pub fn registry(&self) -> Result<MetricRegistry> {
        let names: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        MetricRegistry::from_names(&names)
    }
}

/// Hyperparameter spaces keyed `<family>_hyperparameters`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterSets {
    sets: BTreeMap<String, Value>,
}

impl HyperparameterSets {
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| NcvError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(|k| k.as_str())
    }

    /// Search space of a pipeline, with base-estimator names remapped for
    /// bagging pipelines
    pub fn space_for(&self, pipeline: &Pipeline) -> Result<SearchSpace> {
        let key = format!("{}_hyperparameters", pipeline.family());
        let spec = self.sets.get(&key).ok_or_else(|| {
            NcvError::ConfigError(format!("no '{}' entry for pipeline {}", key, pipeline.name()))
        })?;
        let space = SearchSpace::from_json(spec)?;
        if pipeline.is_bagging() {
            Ok(space.remap_for_bagging())
        } else {
            Ok(space)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.plan().unwrap().n_outer_folds(), 10);
        assert_eq!(config.registry().unwrap().metrics().len(), 5);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(ExperimentConfig::new().with_cv(1, 2).validate().is_err());
        assert!(ExperimentConfig::new().with_n_iter(0).validate().is_err());
        assert!(ExperimentConfig::new().with_importance_repeats(0).validate().is_err());

        let mut config = ExperimentConfig::new();
        config.metrics = vec![Metric::R2];
        assert!(matches!(config.validate(), Err(NcvError::ConfigError(_))));
    }

    #[test]
    fn test_partial_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        fs::write(&path, r#"{"seed": 7, "k_folds": 3, "tie_break": "report_all"}"#).unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.k_folds, 3);
        assert_eq!(config.repeats, 2);
        assert_eq!(config.tie_break, TieBreak::ReportAll);
        assert_eq!(config.importance_weighting, ImportanceWeighting::InverseError);

        config.save(&path).unwrap();
        assert_eq!(ExperimentConfig::load(&path).unwrap().k_folds, 3);
    }

    #[test]
    fn test_space_lookup() {
        let sets = HyperparameterSets::from_json(&json!({
            "en_hyperparameters": {"model__alpha": [0.01, 0.1], "model__l1_ratio": {"uniform": [0.0, 1.0]}},
            "rf_hyperparameters": {}
        }))
        .unwrap();

        let en = Pipeline::from_name("pipe_en", 1).unwrap();
        assert_eq!(sets.space_for(&en).unwrap().len(), 2);

        let bag = Pipeline::from_name("pipe_en_bag", 1).unwrap();
        let names = sets.space_for(&bag).unwrap().param_names();
        assert!(names.iter().all(|n| n.starts_with("bagging__estimator__")));

        let rf = Pipeline::from_name("pipe_rf", 1).unwrap();
        assert!(matches!(sets.space_for(&rf), Err(NcvError::ConfigError(_))));
        let xgb = Pipeline::from_name("pipe_xgb", 1).unwrap();
        assert!(matches!(sets.space_for(&xgb), Err(NcvError::ConfigError(_))));
    }
}
