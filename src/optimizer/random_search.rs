//! Randomized hyperparameter search over inner cross-validation folds

use super::search_space::{format_params, SearchSpace, TrialParams};
use crate::error::{NcvError, Result};
use crate::metrics::Metric;
use crate::training::{CVResults, CvPlan, FittedRegressor, Regressor};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of sampled candidates
pub const DEFAULT_N_ITER: usize = 10;

/// Cross-validated score of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: TrialParams,
    /// Scorer values (greater is better) of every inner fold
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

/// Outcome of a search on one training partition
#[derive(Debug, Clone)]
pub struct SearchResult<F> {
    pub best_index: usize,
    pub best_params: TrialParams,
    /// Mean inner-fold scorer value of the best candidate
    pub best_score: f64,
    /// Standard deviation of the best candidate's inner-fold scores
    pub best_std: f64,
    pub cv_results: Vec<CandidateResult>,
    /// The best candidate refit on the whole training partition
    pub best_estimator: F,
}

/// Randomized search with refit, the tune-and-fit unit of nested
/// cross-validation.
///
/// Candidates come from the search space: when every parameter is a finite
/// list the grid is sampled without replacement (all of it if it has at
/// most `n_iter` points), otherwise `n_iter` independent draws are taken.
/// Each candidate is scored on the plan's inner k-fold splits with a single
/// metric; the first candidate with the highest mean score wins.
#[derive(Debug, Clone)]
pub struct RandomizedSearch<R: Regressor> {
    estimator: R,
    space: SearchSpace,
    scoring: Metric,
    plan: CvPlan,
    n_iter: usize,
    seed: u64,
}

impl<R: Regressor> RandomizedSearch<R> {
    /// Build a search. Every candidate is applied to the estimator up front so
    /// that unknown or ill-typed parameters fail before any fitting.
    pub fn new(estimator: R, space: SearchSpace, scoring: Metric, plan: CvPlan) -> Result<Self> {
        space.validate()?;
        let search = Self {
            estimator,
            space,
            scoring,
            plan,
            n_iter: DEFAULT_N_ITER,
            seed: plan.seed,
        };
        search.check_candidates()?;
        Ok(search)
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Result<Self> {
        if n_iter == 0 {
            return Err(NcvError::ConfigError("n_iter must be at least 1".to_string()));
        }
        self.n_iter = n_iter;
        self.check_candidates()?;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Result<Self> {
        self.seed = seed;
        self.check_candidates()?;
        Ok(self)
    }

    pub fn estimator(&self) -> &R {
        &self.estimator
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn scoring(&self) -> Metric {
        self.scoring
    }

    pub fn plan(&self) -> &CvPlan {
        &self.plan
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn check_candidates(&self) -> Result<()> {
        for params in self.candidates() {
            self.estimator.with_params(&params)?;
        }
        Ok(())
    }

    /// Candidate parameter sets, deterministic for a given seed
    pub fn candidates(&self) -> Vec<TrialParams> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);

        match self.space.grid_size() {
            Some(grid) if grid <= self.n_iter => {
                (0..grid).filter_map(|i| self.space.grid_point(i)).collect()
            }
            Some(grid) => index::sample(&mut rng, grid, self.n_iter)
                .into_iter()
                .filter_map(|i| self.space.grid_point(i))
                .collect(),
            None => (0..self.n_iter).map(|_| self.space.sample(&mut rng)).collect(),
        }
    }

    /// Search on a training partition and refit the winner on all of it
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult<R::Fitted>> {
        let splits = self.plan.inner().split(x.nrows())?;
        let candidates = self.candidates();

        let cv_results = candidates
            .into_par_iter()
            .map(|params| -> Result<CandidateResult> {
                let model = self.estimator.with_params(&params)?;
                let fold_scores = splits
                    .iter()
                    .map(|split| -> Result<f64> {
                        let x_train = x.select(Axis(0), &split.train_indices);
                        let y_train = y.select(Axis(0), &split.train_indices);
                        let x_test = x.select(Axis(0), &split.test_indices);
                        let y_test = y.select(Axis(0), &split.test_indices);

                        let fitted = model.fit(&x_train, &y_train)?;
                        let pred = fitted.predict(&x_test)?;
                        Ok(self.scoring.score(&y_test, &pred))
                    })
                    .collect::<Result<Vec<f64>>>()?;

                let summary = CVResults::from_scores(fold_scores);
                debug!(
                    params = %format_params(&params),
                    mean = summary.mean_score,
                    "Scored candidate"
                );
                Ok(CandidateResult {
                    params,
                    fold_scores: summary.scores,
                    mean_score: summary.mean_score,
                    std_score: summary.std_score,
                })
            })
            .collect::<Result<Vec<CandidateResult>>>()?;

        let best_index = best_candidate(&cv_results).ok_or_else(|| {
            NcvError::TrainingError("no candidate produced a finite score".to_string())
        })?;
        let best = &cv_results[best_index];

        let best_estimator = self.estimator.with_params(&best.params)?.fit(x, y)?;

        Ok(SearchResult {
            best_index,
            best_params: best.params.clone(),
            best_score: best.mean_score,
            best_std: best.std_score,
            best_estimator,
            cv_results,
        })
    }
}

/// First index of the highest finite mean score
fn best_candidate(results: &[CandidateResult]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, r) in results.iter().enumerate() {
        if !r.mean_score.is_finite() {
            continue;
        }
        match best {
            Some((_, score)) if r.mean_score <= score => {}
            _ => best = Some((i, r.mean_score)),
        }
    }
    best.map(|(i, _)| i)
}
