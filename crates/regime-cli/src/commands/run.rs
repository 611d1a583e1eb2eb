//! `regime-cli run`: load each tier's bars from local CSV files, run the
//! pipeline, and emit the resulting signal as JSON.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;
use regime_core::config::RunConfig;
use regime_core::data::{BarSource, FetchRequest};
use regime_core::orchestrator::{run_pipeline, TierInput};
use regime_core::signal::signal_from_report;

use super::csv_source::CsvBarSource;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Ticker symbol to run the pipeline for.
    pub symbol: String,

    /// Directory containing `{symbol}_{bar_size}.csv` files for every
    /// configured tier.
    #[arg(long)]
    pub data_dir: PathBuf,

    /// End of the requested bar range (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Path to a TOML file overriding the default `RunConfig`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the signal JSON here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => RunConfig::default(),
    };
    cfg.validate().context("invalid run configuration")?;

    let end = args.end.unwrap_or_else(|| Utc::now().date_naive());
    let source = CsvBarSource::new(&args.data_dir);

    let mut tier_bars: HashMap<String, TierInput> = HashMap::new();
    for tier in &cfg.tiers {
        let start = end - Duration::days(tier.lookback_days as i64);
        let request = FetchRequest::daily(&args.symbol, start, end).with_bar_size(&tier.bar_size);
        match source.fetch(&request) {
            Ok(health) => {
                if health.bars.is_empty() {
                    tracing::warn!(tier = %tier.name, note = ?health.note, "tier produced no bars");
                }
                tracing::info!(tier = %tier.name, health = ?health.health, "tier bars loaded");
                tier_bars.insert(tier.name.clone(), TierInput { bars: health.bars, health: health.health });
            }
            Err(e) => {
                tracing::warn!(tier = %tier.name, error = %e, "failed to load tier bars");
                tier_bars.insert(
                    tier.name.clone(),
                    TierInput { bars: Vec::new(), health: regime_core::data::DataHealth::Failed },
                );
            }
        }
    }

    let report = run_pipeline(&args.symbol, &tier_bars, &cfg);
    for failure in &report.node_failures {
        tracing::warn!(node = %failure.node, message = %failure.message, "pipeline node degraded");
    }

    let signal = signal_from_report(&report, Utc::now());
    let json = serde_json::to_string_pretty(&signal).context("serializing signal")?;

    match &args.output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
