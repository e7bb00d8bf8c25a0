use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use floodloss_ncv::data::Dataset;
use floodloss_ncv::evaluation::NestedEvaluator;
use floodloss_ncv::metrics::{Metric, MetricRegistry};
use floodloss_ncv::optimizer::{ParameterValue, RandomizedSearch, SearchSpace};
use floodloss_ncv::training::{CvPlan, FittedRegressor, Pipeline, Regressor};
use ndarray::{Array2, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_loss_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>());
    // Relative loss driven by the first two features, clipped to [0, 1]
    let y = x.map_axis(Axis(1), |r| (0.6 * r[0] + 0.3 * r[1] + 0.05 * rng.gen::<f64>()).min(1.0));
    let names = (0..n_features).map(|i| format!("feature_{}", i)).collect();

    Dataset::new(x, y, names, "rloss").unwrap()
}

fn search(name: &str, plan: CvPlan) -> RandomizedSearch<Pipeline> {
    let space = match name {
        "pipe_en" => SearchSpace::new()
            .choice("model__alpha", vec![ParameterValue::Float(0.001), ParameterValue::Float(0.01)])
            .choice("model__l1_ratio", vec![ParameterValue::Float(0.5)]),
        _ => SearchSpace::new()
            .choice("model__n_estimators", vec![ParameterValue::Int(20)])
            .choice("model__max_depth", vec![ParameterValue::Int(3), ParameterValue::Int(5)]),
    };
    RandomizedSearch::new(Pipeline::from_name(name, 42).unwrap(), space, Metric::MAE, plan).unwrap()
}

fn bench_outer_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("outer_loop");
    group.sample_size(10);

    let data = create_loss_data(300, 8);
    let plan = CvPlan::new(5, 2, 42).unwrap();
    let evaluator = NestedEvaluator::new(&data, plan, MetricRegistry::new()).unwrap();

    for name in ["pipe_en", "pipe_rf", "pipe_xgb"] {
        let search = search(name, plan);
        group.bench_with_input(BenchmarkId::new("outer_scores", name), &search, |b, search| {
            b.iter(|| evaluator.outer_scores(black_box(search)).unwrap())
        });
    }

    group.finish();
}

fn bench_permutation_importance(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutation_importance");

    for n_rows in [500, 2000].iter() {
        let data = create_loss_data(*n_rows, 8);
        let plan = CvPlan::new(5, 1, 42).unwrap();
        let evaluator = NestedEvaluator::new(&data, plan, MetricRegistry::new()).unwrap();
        let model = Pipeline::from_name("pipe_xgb", 42)
            .unwrap()
            .fit(evaluator.x(), evaluator.y())
            .unwrap();
        // Warm the prediction path once
        model.predict(evaluator.x()).unwrap();

        group.bench_with_input(BenchmarkId::new("xgb", n_rows), &model, |b, model| {
            b.iter(|| evaluator.permutation_importance(black_box(model), 5, Metric::R2).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_outer_loop, bench_permutation_importance);
criterion_main!(benches);
