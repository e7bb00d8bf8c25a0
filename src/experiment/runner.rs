//! Experiment driver: targets × model families through nested CV

use super::config::{ExperimentConfig, HyperparameterSets};
use super::report::ReportWriter;
use crate::data::{dataset_path, load_csv, Dataset};
use crate::error::{NcvError, Result};
use crate::evaluation::{
    CoefficientTable, FinalModel, InSamplePredictions, MetricSummary, NestedEvaluator, OuterScores,
    PartialDependenceRequest, ResidualTable,
};
use crate::explainability::{aggregate_importances, AggregatedImportance, FamilyImportance, ImportanceResult, PDPResult};
use crate::metrics::{EmpiricalSummary, Metric};
use crate::optimizer::{RandomizedSearch, SearchSpace, TrialParams};
use crate::training::{load_pipeline, CvPlan, FittedPipeline, Pipeline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

/// Where the inputs live and which combinations to run
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub dataset_dir: PathBuf,
    /// Area of interest and flood type, e.g. `german_flash`
    pub aoi_and_floodtype: String,
    pub years: Vec<String>,
    pub targets: Vec<String>,
    pub pipelines: Vec<String>,
    /// Directory with `<pipeline>.json` definitions; predefined pipelines
    /// are used for missing files
    pub pipeline_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

/// Per-fold record of the nested search, persisted next to the final model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldRecord {
    pub index: usize,
    pub repeat: usize,
    pub best_params: TrialParams,
    pub search_score: f64,
    pub search_std: f64,
    /// Raw metric values on the outer-test rows
    pub values: BTreeMap<Metric, f64>,
}

/// Definition of the nested search of one family and its outcome per fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefinition {
    pub pipeline: Pipeline,
    pub space: SearchSpace,
    pub n_iter: usize,
    pub scoring: Metric,
    pub plan: CvPlan,
    pub folds: Vec<FoldRecord>,
}

impl SearchDefinition {
    fn new(search: &RandomizedSearch<Pipeline>, outer: &OuterScores<FittedPipeline>) -> Self {
        let folds = outer
            .folds()
            .iter()
            .map(|fold| FoldRecord {
                index: fold.index,
                repeat: fold.repeat,
                best_params: fold.best_params.clone(),
                search_score: fold.search_score,
                search_std: fold.search_std,
                values: fold
                    .scores
                    .iter()
                    .map(|(m, s)| (*m, m.value_from_score(*s)))
                    .collect(),
            })
            .collect();
        Self {
            pipeline: search.estimator().clone(),
            space: search.space().clone(),
            n_iter: search.n_iter(),
            scoring: search.scoring(),
            plan: *search.plan(),
            folds,
        }
    }
}

/// Everything computed for one model family on one target
#[derive(Debug, Clone)]
pub struct FamilyReport {
    /// Pipeline label, e.g. `en`, `en_bag`, `xgb`
    pub label: String,
    pub n_rows: usize,
    pub zero_loss: usize,
    pub search: SearchDefinition,
    pub summaries: Vec<MetricSummary>,
    pub residuals: ResidualTable,
    pub final_model: FinalModel<FittedPipeline>,
    pub in_sample: InSamplePredictions,
    pub importance: ImportanceResult,
    /// Importance weight derived from the outer-fold mean MAE
    pub weight: f64,
    pub coefficients: Option<CoefficientTable>,
    pub partial_dependence: Vec<PDPResult>,
    pub empirical: EmpiricalSummary,
}

impl FamilyReport {
    pub fn summary(&self, metric: Metric) -> Option<&MetricSummary> {
        self.summaries.iter().find(|s| s.metric == metric)
    }
}

/// Results of one (year, target) combination
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub year: String,
    pub target: String,
    pub feature_names: Vec<String>,
    pub families: Vec<FamilyReport>,
    pub importance: AggregatedImportance,
    /// Features by descending combined importance
    pub final_predictors: Vec<String>,
    /// Rows with an observed target, features in `final_predictors` order
    pub selected_data: Dataset,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub completed: Vec<(String, String)>,
    /// (year, target, error message)
    pub failed: Vec<(String, String, String)>,
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the nested cross-validation protocol over targets and families
#[derive(Debug, Clone)]
pub struct Driver {
    config: ExperimentConfig,
    hyperparameters: HyperparameterSets,
}

impl Driver {
    pub fn new(config: ExperimentConfig, hyperparameters: HyperparameterSets) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hyperparameters,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Every (year, target) combination; a failing combination is logged
    /// and reported, the others still run
    pub fn run(&self, spec: &RunSpec) -> Result<RunSummary> {
        let pipelines = spec
            .pipelines
            .iter()
            .map(|name| load_pipeline(spec.pipeline_dir.as_deref(), name, self.config.seed))
            .collect::<Result<Vec<Pipeline>>>()?;
        let writer = ReportWriter::new(&spec.output_dir, &spec.aoi_and_floodtype);

        let mut summary = RunSummary::default();
        for year in &spec.years {
            for target in &spec.targets {
                info!(year = %year, target = %target, "Starting model processing");
                let start = Instant::now();

                let outcome = self
                    .load_dataset(spec, year, target)
                    .and_then(|data| self.run_target(&data, &pipelines, year))
                    .and_then(|report| writer.write(&report));

                match outcome {
                    Ok(paths) => {
                        info!(
                            year = %year,
                            target = %target,
                            elapsed_secs = start.elapsed().as_secs_f64(),
                            "Finished processing"
                        );
                        summary.written.extend(paths);
                        summary.completed.push((year.clone(), target.clone()));
                    }
                    Err(e) => {
                        error!(year = %year, target = %target, error = %e, "Combination aborted");
                        summary.failed.push((year.clone(), target.clone(), e.to_string()));
                    }
                }
            }
        }
        Ok(summary)
    }

    fn load_dataset(&self, spec: &RunSpec, year: &str, target: &str) -> Result<Dataset> {
        let path = dataset_path(&spec.dataset_dir, &spec.aoi_and_floodtype, year, target);
        let df = load_csv(&path)?;
        info!(path = %path.display(), rows = df.height(), columns = df.width(), "Loaded candidate predictors");
        Dataset::from_dataframe(&df, target)
    }

    /// All families on one target, then the combined importance ranking
    pub fn run_target(&self, data: &Dataset, pipelines: &[Pipeline], year: &str) -> Result<TargetReport> {
        if pipelines.is_empty() {
            return Err(NcvError::ConfigError("no pipelines to run".to_string()));
        }

        let families = pipelines
            .iter()
            .map(|pipeline| self.run_family(data, pipeline))
            .collect::<Result<Vec<FamilyReport>>>()?;

        let importance = aggregate_importances(
            data.feature_names(),
            families
                .iter()
                .map(|f| FamilyImportance {
                    family: f.label.clone(),
                    importances: f.importance.importances_mean.clone(),
                    weight: f.weight,
                })
                .collect(),
        )?;
        let final_predictors = importance.ranked_features();
        info!(
            target = data.target_name(),
            weighting = %self.config.importance_weighting,
            ranking = ?final_predictors,
            "Features by weighted importance"
        );

        let (observed, _) = data.drop_missing_target()?;
        let selected_data = observed.with_feature_order(&final_predictors)?;

        Ok(TargetReport {
            year: year.to_string(),
            target: data.target_name().to_string(),
            feature_names: data.feature_names().to_vec(),
            families,
            importance,
            final_predictors,
            selected_data,
        })
    }

    /// Nested CV, final model and diagnostics for one family
    pub fn run_family(&self, data: &Dataset, pipeline: &Pipeline) -> Result<FamilyReport> {
        let label = pipeline.label().to_string();
        info!(family = %label, target = data.target_name(), "Applying model");

        let data = data.prepare_for(pipeline.missing_value_policy())?;
        let plan = self.config.plan()?;
        let space = self.hyperparameters.space_for(pipeline)?;
        let search = RandomizedSearch::new(pipeline.clone(), space, self.config.tuning_metric, plan)?
            .with_n_iter(self.config.n_iter)?
            .with_seed(self.config.seed)?;

        let evaluator = NestedEvaluator::new(&data, plan, self.config.registry()?)?.with_seed(self.config.seed);
        let evaluation = evaluator.evaluate(&search)?;
        let summaries = evaluation.outer.summaries()?;

        let mut final_model =
            FinalModel::from_outer(&evaluation.outer, self.config.selection_metric, self.config.tie_break)?;
        if self.config.refit_final_on_full_data {
            final_model = final_model.refit_full(pipeline, evaluator.x(), evaluator.y())?;
            debug!(family = %label, "Refit final model on all rows");
        }
        let in_sample = final_model.predict_full(evaluator.x())?;

        let importance = evaluator.permutation_importance(
            &final_model.estimator,
            self.config.importance_repeats,
            self.config.importance_metric,
        )?;
        info!(family = %label, top = ?importance.top_k(5), "Most important features");

        let coefficients = evaluator.regression_coefficients(
            &final_model.estimator,
            &final_model.train_indices,
            self.config.coefficient_significance,
        )?;
        if let Some(table) = &coefficients {
            for row in &table.rows {
                debug!(
                    family = %label,
                    feature = %row.feature,
                    coefficient = row.coefficient,
                    p_value = ?row.p_value,
                    "Regression coefficient"
                );
            }
        }

        let pdp_features: Vec<usize> = match self.config.pdp_top_features {
            Some(k) => importance.sorted_indices().into_iter().take(k).collect(),
            None => (0..data.n_features()).collect(),
        };
        let partial_dependence = pdp_features
            .into_iter()
            .map(|j| {
                evaluator.partial_dependence(&PartialDependenceRequest {
                    model: &final_model.estimator,
                    data: &data,
                    target: data.target_name(),
                    feature: &data.feature_names()[j],
                    scale: self.config.pdp_scale,
                })
            })
            .collect::<Result<Vec<PDPResult>>>()?;

        let mae = evaluation.outer.summary(Metric::MAE)?;
        let weight = self.config.importance_weighting.weight(mae.mean)?;

        let empirical = evaluation.residuals.empirical_vs_predicted();
        info!(
            family = %label,
            median_true = empirical.median_true,
            median_pred = empirical.median_pred,
            mean_true = empirical.mean_true,
            mean_pred = empirical.mean_pred,
            "Empirical vs predicted"
        );

        Ok(FamilyReport {
            label,
            n_rows: data.n_rows(),
            zero_loss: data.zero_target_count(),
            search: SearchDefinition::new(&search, &evaluation.outer),
            summaries,
            residuals: evaluation.residuals,
            final_model,
            in_sample,
            importance,
            weight,
            coefficients,
            partial_dependence,
            empirical,
        })
    }
}
