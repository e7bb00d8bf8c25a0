//! Floodloss CLI Module
//!
//! Command-line interface for nested cross-validation runs, pipeline
//! definitions and dataset inspection.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{load_csv, Dataset};
use crate::experiment::{Driver, ExperimentConfig, HyperparameterSets, RunSpec, RunSummary};
use crate::training::write_default_pipelines;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn fail(s: &str) -> ColoredString   { s.truecolor(230, 110, 110) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<12}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", fail("✗"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "floodloss")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Nested cross-validation of flood-loss regression models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run nested cross-validation over years, targets and pipelines
    Run(RunArgs),

    /// Write the predefined pipeline definitions as JSON
    Pipelines {
        /// Output directory
        #[arg(short, long, default_value = "pipelines")]
        output: PathBuf,

        /// Seed stored in the stochastic estimators
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Summarize a candidate-predictor dataset
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory with `<aoi>/df_<year>_<target>_commercial_<floodtype>.csv` files
    #[arg(short, long)]
    pub dataset_dir: PathBuf,

    /// Area of interest and flood type, e.g. `german_flash`
    #[arg(short, long)]
    pub aoi: String,

    /// Survey years (comma separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub years: Vec<String>,

    /// Target columns (comma separated)
    #[arg(short, long, value_delimiter = ',', default_value = "rloss_b,rloss_e,rloss_gs")]
    pub targets: Vec<String>,

    /// Pipelines (comma separated)
    #[arg(short, long, value_delimiter = ',', default_value = "pipe_en,pipe_rf,pipe_xgb")]
    pub pipelines: Vec<String>,

    /// Directory with `<pipeline>.json` definitions
    #[arg(long)]
    pub pipeline_dir: Option<PathBuf>,

    /// JSON file with `<family>_hyperparameters` search spaces
    #[arg(long, default_value = "config/hyperparameter_sets.json")]
    pub hyperparameters: PathBuf,

    /// Experiment settings (JSON); absent keys keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output root
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Folds per cross-validation pass
    #[arg(short = 'k', long)]
    pub k_folds: Option<usize>,

    /// Repetitions of the outer k-fold
    #[arg(long)]
    pub repeats: Option<usize>,

    /// Candidates drawn by the randomized search
    #[arg(long)]
    pub n_iter: Option<usize>,
}

impl RunArgs {
    fn experiment_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if self.k_folds.is_some() || self.repeats.is_some() {
            let k = self.k_folds.unwrap_or(config.k_folds);
            let r = self.repeats.unwrap_or(config.repeats);
            config = config.with_cv(k, r);
        }
        if let Some(n) = self.n_iter {
            config = config.with_n_iter(n);
        }
        config.validate()?;
        Ok(config)
    }

    fn run_spec(&self) -> RunSpec {
        RunSpec {
            dataset_dir: self.dataset_dir.clone(),
            aoi_and_floodtype: self.aoi.clone(),
            years: self.years.clone(),
            targets: self.targets.clone(),
            pipelines: self.pipelines.clone(),
            pipeline_dir: self.pipeline_dir.clone(),
            output_dir: self.output.clone(),
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(args: &RunArgs) -> anyhow::Result<()> {
    let config = args.experiment_config()?;

    println!();
    line_box_top();
    line_box(&format!("{}", "Nested cross-validation".white().bold()));
    line_box_sep();
    line_box(&kv("AOI", &args.aoi));
    line_box(&kv("Years", &args.years.join(", ")));
    line_box(&kv("Targets", &args.targets.join(", ")));
    line_box(&kv("Pipelines", &args.pipelines.join(", ")));
    line_box(&kv(
        "Folds",
        &format!("{} × {} outer, {} inner", config.k_folds, config.repeats, config.k_folds),
    ));
    line_box(&kv("Candidates", &config.n_iter.to_string()));
    line_box(&kv("Seed", &config.seed.to_string()));
    line_box_bottom();

    step_run("Loading hyperparameter sets");
    let hyperparameters = HyperparameterSets::load(&args.hyperparameters)?;
    step_done(&hyperparameters.keys().collect::<Vec<_>>().join(", "));

    let driver = Driver::new(config, hyperparameters)?;
    let start = Instant::now();
    let summary = driver.run(&args.run_spec())?;

    print_summary(&summary, start.elapsed().as_secs_f64());
    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} combinations failed", summary.failed.len(), summary.failed.len() + summary.completed.len())
    }
}

fn print_summary(summary: &RunSummary, elapsed_secs: f64) {
    section("Summary");
    for (year, target) in &summary.completed {
        step_ok(&format!("{} {}", target, dim(year)));
    }
    for (year, target, message) in &summary.failed {
        step_fail(&format!("{} {}  {}", target, dim(year), muted(message)));
    }
    println!();
    println!("  {:<16} {}", muted("Files"), summary.written.len().to_string().white().bold());
    println!("  {:<16} {}", muted("Time"), format!("{:.1}s", elapsed_secs).white());
    println!();
}

pub fn cmd_pipelines(output: &Path, seed: u64) -> anyhow::Result<()> {
    section("Pipelines");
    for path in write_default_pipelines(output, seed)? {
        step_ok(&path.display().to_string());
    }
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path, target: &str) -> anyhow::Result<()> {
    section("Data Info");

    let start = Instant::now();
    let df = load_csv(data_path)?;
    let data = Dataset::from_dataframe(&df, target)?;
    let (observed, missing_target) = data.drop_missing_target()?;
    let (complete, incomplete) = observed.drop_incomplete_rows()?;

    println!("  {:<16} {}", muted("File"), data_path.display());
    println!("  {:<16} {}", muted("Rows"), data.n_rows());
    println!("  {:<16} {}", muted("Features"), data.n_features());
    println!("  {:<16} {}", muted("Missing target"), missing_target);
    println!("  {:<16} {}", muted("Incomplete rows"), incomplete);
    println!("  {:<16} {}", muted("Complete rows"), complete.n_rows());
    println!("  {:<16} {}", muted("Zero loss"), observed.zero_target_count());
    println!("  {:<16} {:?}", muted("Loaded in"), start.elapsed());
    println!();

    println!("  {:<24} {:>6} {:>8}", muted("Column"), muted("Nulls"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(40)));
    for col in df.get_columns() {
        println!(
            "  {:<24} {:>6} {:>8}",
            col.name().as_str(),
            col.null_count(),
            col.n_unique().unwrap_or(0)
        );
    }

    println!();
    Ok(())
}
