//! The signal row: one flattened, serializable record per pipeline run,
//! This is the stable schema external consumers (a
//! reporting CLI, a research notebook reading a Parquet/CSV dump) depend
//! on — wider than any single internal struct, because it flattens the
//! fused decision, gate outcome, and sizing plan into one row.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fusion::FusionCase;
use crate::gates::Blocker;
use crate::orchestrator::RunReport;
use crate::regime::RegimeLabel;

/// One symbol's fused, gated signal at a point in time — spec §3/§6's
/// `Signal` record, flattened for external consumers. `tier` is always the
/// fusion primary ("MT" by convention); `raw_confidence`/`effective_confidence`
/// come from that tier's own `RegimeDecision` before fusion, `final_confidence`
/// (named `confidence` here to match the rest of this crate's vocabulary) is
/// the fused, gate-facing number. `scaled_weight` is the real sized weight —
/// `0.0` whenever `execution_ready` is `false`, per spec §8 invariant #3 —
/// while `post_gate_hypothetical_size` is what `gates.rs` computed it *would*
/// have sized to had the blockers cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub tier: String,
    pub generated_at: DateTime<Utc>,
    pub label: RegimeLabel,
    pub raw_confidence: f64,
    pub effective_confidence: f64,
    pub confidence: f64,
    pub fusion_case: FusionCase,
    pub higher_tf_disagreement: bool,
    pub execution_ready: bool,
    pub blockers: Vec<Blocker>,
    pub strategy_name: Option<String>,
    pub parameter_set: std::collections::BTreeMap<String, f64>,
    pub raw_weight: f64,
    pub scaled_weight: f64,
    pub post_gate_hypothetical_size: f64,
    pub realized_volatility: Option<f64>,
    pub consistency_score: f64,
    pub consistency_clean: bool,
    pub best_strategy_id: Option<String>,
    pub best_sharpe: Option<f64>,
}

impl Signal {
    /// Comma-separated blocker identifiers, the `blockers_csv` column
    /// spec §6's persisted schema names.
    pub fn blockers_csv(&self) -> String {
        self.blockers.iter().map(|b| b.id()).collect::<Vec<_>>().join(",")
    }
}

/// Flatten a `RunReport` into its signal row, stamping `generated_at` from
/// the caller since this module never reads the clock itself.
pub fn signal_from_report(report: &RunReport, generated_at: DateTime<Utc>) -> Signal {
    let primary_decision = report
        .tier_decisions
        .iter()
        .find(|d| d.tier == "MT")
        .or_else(|| report.tier_decisions.first());

    let (execution_ready, blockers, post_gate_hypothetical_size, realized_volatility) =
        match &report.gate_evaluation {
            Some(gate) => (
                gate.execution_ready,
                gate.blockers.clone(),
                gate.post_gate.allocation.weights.first().copied().unwrap_or(0.0),
                Some(gate.post_gate.allocation.realized_volatility),
            ),
            None => (false, Vec::new(), 0.0, None),
        };

    let best = report.search.as_ref().and_then(|s| s.best());
    let best_strategy_id = best.map(|c| c.spec.id().to_string());
    let best_sharpe = best.map(|c| c.metrics.sharpe);
    let parameter_set = best.map(|c| c.spec.parameter_set()).unwrap_or_default();

    Signal {
        symbol: report.symbol.clone(),
        tier: primary_decision.map(|d| d.tier.clone()).unwrap_or_else(|| "MT".to_string()),
        generated_at,
        label: report.fused.label,
        raw_confidence: primary_decision.map(|d| d.raw_confidence).unwrap_or(0.0),
        effective_confidence: primary_decision.map(|d| d.effective_confidence).unwrap_or(0.0),
        confidence: report.fused.confidence,
        fusion_case: report.fused.case,
        higher_tf_disagreement: report.fused.higher_tf_disagreement,
        execution_ready,
        blockers,
        strategy_name: best_strategy_id.clone(),
        parameter_set,
        raw_weight: report.fused.confidence,
        scaled_weight: report.scaled_weight.unwrap_or(0.0),
        post_gate_hypothetical_size,
        realized_volatility,
        consistency_score: report.consistency.consistency_score,
        consistency_clean: report.consistency.is_clean(),
        best_strategy_id,
        best_sharpe,
    }
}

/// Render a batch of signals into a polars `DataFrame` — one row per
/// signal, columns matching `Signal`'s fields with enums rendered as their
/// display strings since polars has no native enum column type here.
pub fn signals_to_dataframe(signals: &[Signal]) -> Result<DataFrame> {
    let symbol: Vec<&str> = signals.iter().map(|s| s.symbol.as_str()).collect();
    let tier: Vec<&str> = signals.iter().map(|s| s.tier.as_str()).collect();
    let generated_at: Vec<i64> = signals.iter().map(|s| s.generated_at.timestamp()).collect();
    let label: Vec<String> = signals.iter().map(|s| format!("{:?}", s.label)).collect();
    let raw_confidence: Vec<f64> = signals.iter().map(|s| s.raw_confidence).collect();
    let effective_confidence: Vec<f64> = signals.iter().map(|s| s.effective_confidence).collect();
    let confidence: Vec<f64> = signals.iter().map(|s| s.confidence).collect();
    let execution_ready: Vec<bool> = signals.iter().map(|s| s.execution_ready).collect();
    let blockers_csv: Vec<String> = signals.iter().map(|s| s.blockers_csv()).collect();
    let strategy_name: Vec<Option<&str>> = signals.iter().map(|s| s.strategy_name.as_deref()).collect();
    let raw_weight: Vec<f64> = signals.iter().map(|s| s.raw_weight).collect();
    let scaled_weight: Vec<f64> = signals.iter().map(|s| s.scaled_weight).collect();
    let post_gate_hypothetical_size: Vec<f64> =
        signals.iter().map(|s| s.post_gate_hypothetical_size).collect();
    let consistency_score: Vec<f64> = signals.iter().map(|s| s.consistency_score).collect();
    let consistency_clean: Vec<bool> = signals.iter().map(|s| s.consistency_clean).collect();
    let best_strategy_id: Vec<Option<&str>> = signals
        .iter()
        .map(|s| s.best_strategy_id.as_deref())
        .collect();
    let best_sharpe: Vec<Option<f64>> = signals.iter().map(|s| s.best_sharpe).collect();

    let df = df! {
        "symbol" => symbol,
        "tier" => tier,
        "generated_at" => generated_at,
        "label" => label,
        "raw_confidence" => raw_confidence,
        "effective_confidence" => effective_confidence,
        "final_confidence" => confidence,
        "execution_ready" => execution_ready,
        "blockers_csv" => blockers_csv,
        "strategy_name" => strategy_name,
        "raw_weight" => raw_weight,
        "scaled_weight" => scaled_weight,
        "post_gate_hypothetical_size" => post_gate_hypothetical_size,
        "consistency_score" => consistency_score,
        "consistency_clean" => consistency_clean,
        "best_strategy_id" => best_strategy_id,
        "best_sharpe" => best_sharpe,
    }?;

    Ok(df)
}
