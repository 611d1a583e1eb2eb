//! Pipeline orchestrator: runs one symbol's bars through every stage in a
//! fixed node order — setup, load, features, regime, fusion, strategy
//! search, backtest, gates, sizing, reporting — recording per-node timing
//! and tolerating a failure in any one node by degrading gracefully instead
//! of aborting the whole run.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::run_backtest;
use crate::bar::Bar;
use crate::config::RunConfig;
use crate::consistency::{check_consistency, ConsistencyReport};
use crate::data::{DataHealth, DataQualityChecker};
use crate::features::{compute_features, FeatureBundle};
use crate::fusion::{fuse, FusedDecision};
use crate::gates::{evaluate_gates, GateEvaluation};
use crate::gridsearch::{rank_candidates, GridSearchReport};
use crate::metrics::{compute_metrics, Metrics};
use crate::statistics::BlockBootstrapConfig;
use crate::regime::{build_decision, classify, HysteresisFilter, RegimeDecision, RegimeLabel};
use crate::strategy::{parameter_grid, signal_from_bars, StrategyFamily, StrategySpec, CANONICAL_STRATEGY_IDS};
use crate::transitions::compute_transition_metrics;
use crate::walkforward::{run_walk_forward, WalkForwardResult};

/// One tier's bars plus the data-health marker its upstream `BarSource`
/// reported (spec §6: `get_bars(...) -> (bar_series, health)`). The `load`
/// node combines this with its own quality-check findings rather than
/// overriding it — a source that already reported `fallback` stays
/// `fallback` even if the fallback bars happen to pass quality checks.
#[derive(Debug, Clone)]
pub struct TierInput {
    pub bars: Vec<Bar>,
    pub health: DataHealth,
}

impl From<Vec<Bar>> for TierInput {
    /// Bars with no upstream health marker are assumed fresh; the `load`
    /// node's own quality checks still apply on top.
    fn from(bars: Vec<Bar>) -> Self {
        Self { bars, health: DataHealth::Fresh }
    }
}

fn health_severity(h: DataHealth) -> u8 {
    match h {
        DataHealth::Fresh => 0,
        DataHealth::Stale => 1,
        DataHealth::Fallback => 2,
        DataHealth::Failed => 3,
    }
}

fn worse_health(a: DataHealth, b: DataHealth) -> DataHealth {
    if health_severity(a) >= health_severity(b) {
        a
    } else {
        b
    }
}

/// One node's wall-clock cost within a single `run_pipeline` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTiming {
    pub node: String,
    pub duration_ms: f64,
}

/// A node that failed, with the degraded fallback the run continued with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node: String,
    pub message: String,
}

/// Full output of one pipeline run over one symbol's multi-tier bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub symbol: String,
    pub tier_health: HashMap<String, DataHealth>,
    pub tier_features: HashMap<String, FeatureBundle>,
    pub tier_decisions: Vec<RegimeDecision>,
    pub fused: FusedDecision,
    pub search: Option<GridSearchReport>,
    pub walk_forward: Option<WalkForwardResult>,
    pub walk_forward_metrics: Option<Metrics>,
    pub gate_evaluation: Option<GateEvaluation>,
    /// The real sized weight, enforced to `0.0` whenever the gates blocked
    /// execution (spec §8 invariant #3) — distinct from
    /// `gate_evaluation.post_gate.allocation`, which stays the hypothetical
    /// plan regardless of whether it was ever actually executable.
    pub scaled_weight: Option<f64>,
    pub consistency: ConsistencyReport,
    pub node_timings: Vec<NodeTiming>,
    pub node_failures: Vec<NodeFailure>,
}

fn strategy_family_for(label: RegimeLabel) -> StrategyFamily {
    match label.base() {
        RegimeLabel::Trending => StrategyFamily::Trending,
        RegimeLabel::MeanReverting => StrategyFamily::MeanReverting,
        _ => StrategyFamily::Neutral,
    }
}

fn candidates_for_family(family: StrategyFamily) -> Vec<StrategySpec> {
    CANONICAL_STRATEGY_IDS
        .iter()
        .flat_map(|id| parameter_grid(id, 1))
        .filter(|spec| spec.family() == family)
        .collect()
}

/// Slide a window of `tier_min_observations` bars across the tail of
/// `bars`, classifying each window independently, to produce the rolling
/// label track and matching realized-vol history that `transitions.rs` and
/// `regime::apply_volatility_prefix` need. Bounded to the classifier's
/// configured `rolling_track_windows`.
fn rolling_track(
    bars: &[Bar],
    tier_name: &str,
    min_observations: usize,
    annualization_factor: f64,
    classifier_cfg: &crate::config::ClassifierConfig,
) -> (Vec<RegimeLabel>, Vec<f64>) {
    let windows = classifier_cfg.rolling_track_windows.max(1);
    if bars.len() < min_observations {
        return (Vec::new(), Vec::new());
    }

    let n_possible = bars.len() - min_observations + 1;
    let n_windows = n_possible.min(windows);
    let start_offset = n_possible - n_windows;

    let mut labels = Vec::with_capacity(n_windows);
    let mut vols = Vec::with_capacity(n_windows);

    for w in 0..n_windows {
        let end = min_observations + start_offset + w;
        let window = &bars[end - min_observations..end];
        let features = compute_features(window, tier_name, min_observations, annualization_factor);
        let label = classify(&features, classifier_cfg)
            .map(|s| s.label)
            .unwrap_or(RegimeLabel::Indeterminate);
        labels.push(label);
        vols.push(features.realized_vol_annualized.unwrap_or(0.0));
    }

    (labels, vols)
}

fn confirm_with_hysteresis(track: &[RegimeLabel], final_label: RegimeLabel, m_bars: usize) -> RegimeLabel {
    let mut filter = HysteresisFilter::new(m_bars);
    let mut confirmed = RegimeLabel::Indeterminate;
    for &label in track.iter().chain(std::iter::once(&final_label)) {
        confirmed = filter.push(label);
    }
    confirmed
}

/// Run the full pipeline for one symbol.
///
/// `tier_inputs` must contain one entry per tier named in `cfg.tiers`
/// (typically "LT", "MT", "ST"), each carrying whatever upstream data-health
/// marker its `BarSource` reported — `Vec<Bar>` converts via `.into()` for
/// callers with no upstream health to report (assumed fresh). Primary-tier
/// strategy search and backtest use the tier config's `fusion`-weighted
/// primary ("MT" by convention, `fusion.rs`); a missing primary tier
/// degrades the run rather than failing it outright.
pub fn run_pipeline(symbol: &str, tier_inputs: &HashMap<String, TierInput>, cfg: &RunConfig) -> RunReport {
    let mut timings = Vec::new();
    let mut failures = Vec::new();

    let setup_start = Instant::now();
    let setup_ok = cfg.validate();
    timings.push(NodeTiming {
        node: "setup".to_string(),
        duration_ms: setup_start.elapsed().as_secs_f64() * 1000.0,
    });
    if let Err(e) = setup_ok {
        failures.push(NodeFailure {
            node: "setup".to_string(),
            message: e.to_string(),
        });
    }

    let load_start = Instant::now();
    let mut tier_health: HashMap<String, DataHealth> = HashMap::new();
    let mut tier_bars: HashMap<String, Vec<Bar>> = HashMap::new();
    for tier in &cfg.tiers {
        let empty = TierInput::from(Vec::new());
        let input = tier_inputs.get(&tier.name).unwrap_or(&empty);
        let bars = input.bars.as_slice();
        let checker = DataQualityChecker::new().with_timeframe(tier.bar_size.clone());
        let report = checker.check(bars);
        let quality_health = if bars.is_empty() {
            DataHealth::Failed
        } else if report.invalid_ohlc_count > 0 || report.out_of_order_count > 0 {
            DataHealth::Failed
        } else if report.gap_count > 0 {
            DataHealth::Stale
        } else {
            DataHealth::Fresh
        };
        let health = worse_health(input.health, quality_health);
        tier_health.insert(tier.name.clone(), health);
        tier_bars.insert(tier.name.clone(), input.bars.clone());
    }
    timings.push(NodeTiming {
        node: "load".to_string(),
        duration_ms: load_start.elapsed().as_secs_f64() * 1000.0,
    });

    let features_start = Instant::now();
    // Tiers are independent of each other here, so compute them in
    // parallel the same way `gridsearch::rank_candidates` parallelizes
    // independent grid candidates.
    let per_tier: Vec<(String, FeatureBundle, (Vec<RegimeLabel>, Vec<f64>))> = cfg
        .tiers
        .par_iter()
        .map(|tier| {
            let bars = tier_bars.get(&tier.name).map(|b| b.as_slice()).unwrap_or(&[]);
            let features = compute_features(bars, &tier.name, tier.min_observations, tier.annualization_factor);
            let track = rolling_track(
                bars,
                &tier.name,
                tier.min_observations,
                tier.annualization_factor,
                &cfg.classifier,
            );
            (tier.name.clone(), features, track)
        })
        .collect();

    let mut tier_features: HashMap<String, FeatureBundle> = HashMap::new();
    let mut tier_tracks: HashMap<String, (Vec<RegimeLabel>, Vec<f64>)> = HashMap::new();
    for (name, features, track) in per_tier {
        tier_features.insert(name.clone(), features);
        tier_tracks.insert(name, track);
    }
    timings.push(NodeTiming {
        node: "features".to_string(),
        duration_ms: features_start.elapsed().as_secs_f64() * 1000.0,
    });

    let regime_start = Instant::now();
    let mut decisions = Vec::new();
    for tier in &cfg.tiers {
        let features = tier_features.get(&tier.name).cloned().unwrap_or_else(|| {
            compute_features(&[], &tier.name, tier.min_observations, tier.annualization_factor)
        });
        let (track, vol_hist) = tier_tracks
            .get(&tier.name)
            .cloned()
            .unwrap_or((Vec::new(), Vec::new()));

        let metrics = compute_transition_metrics(&track, Some(&vol_hist));
        let mut decision = build_decision(
            &tier.name,
            &features,
            &cfg.classifier,
            &vol_hist,
            metrics.flip_density,
            metrics.entropy_norm,
        );
        decision.label = confirm_with_hysteresis(&track, decision.label, tier.m_bars);
        decisions.push(decision);
    }
    timings.push(NodeTiming {
        node: "regime".to_string(),
        duration_ms: regime_start.elapsed().as_secs_f64() * 1000.0,
    });

    let fusion_start = Instant::now();
    let fused = fuse(&decisions, &cfg.fusion);
    timings.push(NodeTiming {
        node: "fusion".to_string(),
        duration_ms: fusion_start.elapsed().as_secs_f64() * 1000.0,
    });

    let primary_tier = cfg.tier("MT").or_else(|| cfg.tiers.first());
    let primary_bars: &[Bar] = primary_tier
        .and_then(|t| tier_bars.get(&t.name))
        .map(|b| b.as_slice())
        .unwrap_or(&[]);

    let search_start = Instant::now();
    let family = strategy_family_for(fused.label);
    let candidates = candidates_for_family(family);
    let search = if primary_bars.is_empty() || candidates.is_empty() {
        failures.push(NodeFailure {
            node: "strategy_search".to_string(),
            message: "no bars or no candidates available for the fused family".to_string(),
        });
        None
    } else {
        match rank_candidates(
            primary_bars,
            &candidates,
            &cfg.backtest,
            &cfg.strategy_search,
            primary_tier.map(|t| t.annualization_factor).unwrap_or(252.0),
        ) {
            Ok(report) => Some(report),
            Err(e) => {
                failures.push(NodeFailure {
                    node: "strategy_search".to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    };
    timings.push(NodeTiming {
        node: "strategy_search".to_string(),
        duration_ms: search_start.elapsed().as_secs_f64() * 1000.0,
    });

    let backtest_start = Instant::now();
    let (walk_forward, walk_forward_metrics) = if primary_bars.is_empty() || candidates.is_empty() {
        (None, None)
    } else {
        match run_walk_forward(
            primary_bars,
            &candidates,
            &cfg.backtest,
            &cfg.strategy_search,
            primary_tier.map(|t| t.annualization_factor).unwrap_or(252.0),
        ) {
            Ok(result) => {
                // Metrics are computed on the concatenated out-of-sample
                // validation stream across every fold, not just the most
                // recent one, matching the leakage-free aggregation spec
                // §4.7 describes; the Sharpe CI bootstrap runs once here
                // since this is the final reported result, not a grid-search
                // candidate evaluation.
                let stitched = result.stitched_validation_result();
                let bootstrap_cfg = BlockBootstrapConfig::for_time_series(stitched.equity.len());
                let aggregate = compute_metrics(
                    &stitched,
                    primary_tier.map(|t| t.annualization_factor).unwrap_or(252.0),
                    Some(&bootstrap_cfg),
                );
                (Some(result), Some(aggregate))
            }
            Err(e) => {
                failures.push(NodeFailure {
                    node: "backtest".to_string(),
                    message: e.to_string(),
                });
                (None, None)
            }
        }
    };
    timings.push(NodeTiming {
        node: "backtest".to_string(),
        duration_ms: backtest_start.elapsed().as_secs_f64() * 1000.0,
    });

    let gates_start = Instant::now();
    let primary_features = primary_tier
        .and_then(|t| tier_features.get(&t.name))
        .cloned()
        .unwrap_or_else(|| compute_features(&[], "MT", 300, 252.0));
    let primary_vol_history = primary_tier
        .and_then(|t| tier_tracks.get(&t.name))
        .map(|(_, vols)| vols.clone())
        .unwrap_or_default();
    let health_vec: Vec<DataHealth> = cfg
        .tiers
        .iter()
        .map(|t| *tier_health.get(&t.name).unwrap_or(&DataHealth::Failed))
        .collect();
    let best_candidate_returns: Vec<Vec<f64>> = search
        .as_ref()
        .and_then(|r| r.best())
        .map(|candidate| {
            let signal = signal_from_bars(&candidate.spec, primary_bars);
            match run_backtest(primary_bars, &signal, 1.0, &cfg.backtest.cost) {
                Ok(result) => vec![result.returns()],
                Err(_) => Vec::new(),
            }
        })
        .unwrap_or_default();

    let gate_evaluation = match evaluate_gates(
        &fused,
        &health_vec,
        primary_features.realized_vol_annualized.unwrap_or(0.0),
        &primary_vol_history,
        &cfg.gates,
        fused.confidence,
        &best_candidate_returns,
    ) {
        Ok(evaluation) => Some(evaluation),
        Err(e) => {
            failures.push(NodeFailure {
                node: "gates".to_string(),
                message: e.to_string(),
            });
            None
        }
    };
    timings.push(NodeTiming {
        node: "gates".to_string(),
        duration_ms: gates_start.elapsed().as_secs_f64() * 1000.0,
    });

    let sizing_start = Instant::now();
    // Sizing is the gate evaluation's post-gate allocation, but invariant
    // #3 (spec §8) requires the *real* scaled weight to be exactly zero
    // whenever execution_ready is false — `gates.rs` always computes a
    // hypothetical allocation for audit purposes even when blocked, so
    // that hypothetical figure must never leak into the weight actually
    // reported as sized.
    let gates_blocked = gate_evaluation.as_ref().map(|g| !g.execution_ready).unwrap_or(true);
    let scaled_weight = if gates_blocked {
        Some(0.0)
    } else {
        gate_evaluation
            .as_ref()
            .and_then(|g| g.post_gate.allocation.weights.first().copied())
    };
    timings.push(NodeTiming {
        node: "sizing".to_string(),
        duration_ms: sizing_start.elapsed().as_secs_f64() * 1000.0,
    });

    let reporting_start = Instant::now();
    let decisions_for_consistency = decisions.clone();
    let features_vec: Vec<FeatureBundle> = cfg
        .tiers
        .iter()
        .filter_map(|t| tier_features.get(&t.name).cloned())
        .collect();
    let consistency = check_consistency(
        &decisions_for_consistency,
        &features_vec,
        &fused,
        gates_blocked,
        scaled_weight,
    );
    timings.push(NodeTiming {
        node: "reporting".to_string(),
        duration_ms: reporting_start.elapsed().as_secs_f64() * 1000.0,
    });

    RunReport {
        symbol: symbol.to_string(),
        tier_health,
        tier_features,
        tier_decisions: decisions,
        fused,
        search,
        walk_forward,
        walk_forward_metrics,
        gate_evaluation,
        scaled_weight,
        consistency,
        node_timings: timings,
        node_failures: failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use chrono::TimeZone;

    fn bars_from_closes(closes: &[f64], tag: &str) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = chrono::Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64);
                Bar::new(ts, c, c * 1.01, c * 0.99, c, 1000.0, "TEST", tag)
            })
            .collect()
    }

    #[test]
    fn pipeline_runs_end_to_end_with_sparse_data_and_degrades_gracefully() {
        let cfg = RunConfig::default();
        let mut tier_bars = HashMap::new();
        for tier in &cfg.tiers {
            tier_bars.insert(tier.name.clone(), TierInput::from(Vec::new()));
        }
        let report = run_pipeline("TEST", &tier_bars, &cfg);
        assert_eq!(report.symbol, "TEST");
        assert_eq!(report.fused.label, RegimeLabel::Indeterminate);
        assert!(report.node_timings.iter().any(|t| t.node == "reporting"));
    }

    #[test]
    fn pipeline_produces_a_timing_entry_per_node() {
        let cfg = RunConfig::default();
        let closes: Vec<f64> = (0..400).map(|i| 100.0 + (i as f64 * 0.05).sin() * 5.0 + i as f64 * 0.02).collect();
        let mut tier_bars = HashMap::new();
        for tier in &cfg.tiers {
            tier_bars.insert(
                tier.name.clone(),
                TierInput::from(bars_from_closes(&closes, &tier.bar_size)),
            );
        }
        let report = run_pipeline("TEST", &tier_bars, &cfg);
        let expected_nodes = [
            "setup",
            "load",
            "features",
            "regime",
            "fusion",
            "strategy_search",
            "backtest",
            "gates",
            "sizing",
            "reporting",
        ];
        for node in expected_nodes {
            assert!(
                report.node_timings.iter().any(|t| t.node == node),
                "missing timing for node {node}"
            );
        }
    }

    #[test]
    fn missing_primary_tier_bars_still_produces_a_fused_decision() {
        let cfg = RunConfig::default();
        let tier_bars: HashMap<String, TierInput> = HashMap::new();
        let report = run_pipeline("TEST", &tier_bars, &cfg);
        assert_eq!(report.fused.label, RegimeLabel::Indeterminate);
        assert!(report.gate_evaluation.is_some());
    }

    #[test]
    fn scaled_weight_is_zero_whenever_execution_is_blocked() {
        let cfg = RunConfig::default();
        let tier_bars: HashMap<String, TierInput> = HashMap::new();
        let report = run_pipeline("TEST", &tier_bars, &cfg);
        let blocked = report
            .gate_evaluation
            .as_ref()
            .map(|g| !g.execution_ready)
            .unwrap_or(true);
        assert!(blocked, "this scenario is expected to be blocked");
        assert_eq!(report.scaled_weight, Some(0.0));
        assert!(!report
            .consistency
            .findings
            .iter()
            .any(|f| f.rule == "sizing_vs_gates"));
    }

    #[test]
    fn upstream_fallback_health_survives_passing_quality_checks() {
        let cfg = RunConfig::default();
        let closes: Vec<f64> = (0..400).map(|i| 100.0 + (i as f64 * 0.05).sin() * 5.0 + i as f64 * 0.02).collect();
        let mut tier_bars = HashMap::new();
        for tier in &cfg.tiers {
            let health = if tier.name == "MT" { DataHealth::Fallback } else { DataHealth::Fresh };
            tier_bars.insert(
                tier.name.clone(),
                TierInput { bars: bars_from_closes(&closes, &tier.bar_size), health },
            );
        }
        let report = run_pipeline("TEST", &tier_bars, &cfg);
        assert_eq!(report.tier_health.get("MT"), Some(&DataHealth::Fallback));
    }
}
