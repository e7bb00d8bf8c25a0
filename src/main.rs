//! Floodloss - Main Entry Point
//!
//! Nested cross-validation of flood-loss regression models from the command line.

use clap::Parser;
use floodloss_ncv::cli::{cmd_info, cmd_pipelines, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floodloss_ncv=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(&args)?,
        Commands::Pipelines { output, seed } => cmd_pipelines(&output, seed)?,
        Commands::Info { data, target } => cmd_info(&data, &target)?,
    }

    Ok(())
}
