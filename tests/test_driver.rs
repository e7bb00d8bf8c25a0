//! Integration test: experiment driver end-to-end

use floodloss_ncv::data::{dataset_path, load_csv, save_csv, Dataset};
use floodloss_ncv::experiment::{Driver, ExperimentConfig, HyperparameterSets, RunSpec};
use floodloss_ncv::training::Pipeline;
use floodloss_ncv::NcvError;
use polars::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

fn survey_df(n: usize) -> DataFrame {
    let depth: Vec<Option<f64>> = (0..n)
        .map(|i| if i == 4 { None } else { Some((i % 9) as f64 * 0.25) })
        .collect();
    let duration: Vec<Option<f64>> = (0..n)
        .map(|i| if i == 11 { None } else { Some(((i * 7) % 5) as f64 + 1.0) })
        .collect();
    let area: Vec<f64> = (0..n).map(|i| 50.0 + ((i * 13) % 17) as f64 * 10.0).collect();
    let target: Vec<Option<f64>> = (0..n)
        .map(|i| match i {
            7 | 20 => None,
            _ => Some(0.08 * (i % 9) as f64 + 0.02 * ((i * 7) % 5) as f64 + 0.001 * (i % 3) as f64),
        })
        .collect();

    df!(
        "rloss_b" => target,
        "water_depth" => depth,
        "duration" => duration,
        "building_area" => area
    )
    .unwrap()
}

fn hyperparameters() -> HyperparameterSets {
    HyperparameterSets::from_json(&json!({
        "en_hyperparameters": {"model__alpha": [0.001, 0.01], "model__l1_ratio": [0.5], "model__max_iter": [100000]},
        "xgb_hyperparameters": {"model__n_estimators": [10, 20], "model__max_depth": [2, 3]}
    }))
    .unwrap()
}

fn config() -> ExperimentConfig {
    ExperimentConfig::new()
        .with_seed(3)
        .with_cv(3, 1)
        .with_n_iter(2)
        .with_importance_repeats(2)
}

fn write_dataset(dir: &Path, year: &str) {
    let path = dataset_path(dir, "german_flash", year, "rloss_b");
    save_csv(&mut survey_df(36), &path).unwrap();
}

#[test]
fn test_run_writes_all_artifacts() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_dataset(input.path(), "2021");

    let driver = Driver::new(config(), hyperparameters()).unwrap();
    let spec = RunSpec {
        dataset_dir: input.path().to_path_buf(),
        aoi_and_floodtype: "german_flash".to_string(),
        years: vec!["2021".to_string()],
        targets: vec!["rloss_b".to_string()],
        pipelines: vec!["pipe_en".to_string(), "pipe_xgb".to_string()],
        pipeline_dir: None,
        output_dir: output.path().to_path_buf(),
    };
    let summary = driver.run(&spec).unwrap();

    assert!(summary.is_success(), "{:?}", summary.failed);
    assert_eq!(summary.completed.len(), 1);
    // 2 tables, per family 2 models + residuals + 3 PDPs, EN coefficients, final predictors
    assert_eq!(summary.written.len(), 16);
    assert!(summary.written.iter().all(|p| p.exists()));

    let eval_dir = output.path().join("models_evaluation").join("german_flash");
    let perf = load_csv(&eval_dir.join("performance_rloss_b_2021_german_flash.csv")).unwrap();
    assert_eq!(perf.height(), 5);
    let columns: Vec<&str> = perf.get_column_names().into_iter().map(|n| n.as_str()).collect();
    assert_eq!(columns, vec!["metric", "en_score", "en_score_std", "xgb_score", "xgb_score_std"]);
    let mae = perf.column("en_score").unwrap().f64().unwrap().get(0).unwrap();
    assert!(mae >= 0.0);

    assert!(eval_dir.join("regression_coefficients_en_rloss_b_2021_german_flash.csv").exists());
    assert!(!eval_dir.join("regression_coefficients_xgb_rloss_b_2021_german_flash.csv").exists());
    assert!(eval_dir.join("pdp_xgb_water_depth_rloss_b_2021_german_flash.csv").exists());

    let importances = load_csv(&eval_dir.join("feature_importances_rloss_b_2021_german_flash.csv")).unwrap();
    assert_eq!(importances.height(), 3);
    assert!(importances.column("weighted_sum_importances").is_ok());

    let selected = load_csv(
        &output
            .path()
            .join("selected_features")
            .join("german_flash")
            .join("final_predictors_rloss_b_2021_german_flash.csv"),
    )
    .unwrap();
    assert_eq!(selected.get_column_names()[0].as_str(), "rloss_b");
    assert_eq!(selected.height(), 34);

    let model = output
        .path()
        .join("models_trained")
        .join("final_models")
        .join("german_flash")
        .join("xgb_rloss_b_2021_german_flash.json");
    assert!(model.exists());
}

#[test]
fn test_missing_combination_does_not_abort_run() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_dataset(input.path(), "2021");

    let driver = Driver::new(config(), hyperparameters()).unwrap();
    let spec = RunSpec {
        dataset_dir: input.path().to_path_buf(),
        aoi_and_floodtype: "german_flash".to_string(),
        years: vec!["2013".to_string(), "2021".to_string()],
        targets: vec!["rloss_b".to_string()],
        pipelines: vec!["pipe_en".to_string()],
        pipeline_dir: None,
        output_dir: output.path().to_path_buf(),
    };
    let summary = driver.run(&spec).unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "2013");
    assert_eq!(summary.completed, vec![("2021".to_string(), "rloss_b".to_string())]);
}

#[test]
fn test_run_target_ranks_features() {
    let data = Dataset::from_dataframe(&survey_df(36), "rloss_b").unwrap();
    let driver = Driver::new(config(), hyperparameters()).unwrap();
    let pipelines = vec![
        Pipeline::from_name("pipe_en", 3).unwrap(),
        Pipeline::from_name("pipe_xgb", 3).unwrap(),
    ];
    let report = driver.run_target(&data, &pipelines, "2021").unwrap();

    assert_eq!(report.families.len(), 2);
    assert_eq!(report.families[0].n_rows, 32);
    assert_eq!(report.families[1].n_rows, 34);
    assert_eq!(report.families[0].search.folds.len(), 3);
    assert!(report.families[1].coefficients.is_none());

    let en = &report.families[0];
    assert!(!en.final_model.refit_on_full_data);
    let n_fit = en.final_model.train_indices.len();
    assert!(n_fit < en.n_rows);
    let coefficients = en.coefficients.as_ref().unwrap();
    assert_eq!(coefficients.residual_df, Some(n_fit - 4));
    assert_eq!(report.importance.families.len(), 2);
    assert_eq!(report.selected_data.feature_names(), report.final_predictors.as_slice());
    assert!(report.families.iter().all(|f| f.weight > 0.0));
}

#[test]
fn test_unknown_hyperparameter_family_fails_combination() {
    let data = Dataset::from_dataframe(&survey_df(36), "rloss_b").unwrap();
    let driver = Driver::new(config(), hyperparameters()).unwrap();
    let pipelines = vec![Pipeline::from_name("pipe_rf", 3).unwrap()];
    assert!(driver.run_target(&data, &pipelines, "2021").is_err());
}

#[test]
fn test_non_converging_family_fails_combination() {
    let data = Dataset::from_dataframe(&survey_df(36), "rloss_b").unwrap();
    let sets = HyperparameterSets::from_json(&json!({
        "en_hyperparameters": {"model__alpha": [0.000001], "model__max_iter": [1]}
    }))
    .unwrap();
    let driver = Driver::new(config(), sets).unwrap();
    let pipelines = vec![Pipeline::from_name("pipe_en", 3).unwrap()];
    assert!(matches!(
        driver.run_target(&data, &pipelines, "2021"),
        Err(NcvError::ConvergenceError { iterations: 1 })
    ));
}
