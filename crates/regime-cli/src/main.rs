//! regime-cli - command-line driver for the regime-detection and
//! strategy-selection pipeline.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use regime_logging::LogConfig;

#[derive(Parser)]
#[command(name = "regime-cli")]
#[command(author, version, about = "Multi-timeframe regime detection and strategy selection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one symbol against local CSV bar data.
    Run(commands::run::RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env();
    let _guard = regime_logging::init_launcher_logging(&log_config);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
    }
}
