//! Risk gates: the last read-only checkpoint before a fused decision is
//! allowed to become a real position. A gate never mutates the decision it
//! evaluates — it only decides whether downstream sizing may act on it, and
//! records a hypothetical sizing plan either way so a blocked run is still
//! auditable.

use serde::{Deserialize, Serialize};

use crate::config::GatesConfig;
use crate::data::DataHealth;
use crate::fusion::FusedDecision;
use crate::regime::RegimeLabel;
use crate::sizing::{allocate, AllocationResult};

/// The six ordered blocker identifiers. Order is fixed regardless of which
/// conditions are actually triggered, so a caller's report always lists
/// blockers in this sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blocker {
    DataFailed,
    LowConfidence,
    HigherTfDisagree,
    IndeterminateRegime,
    VolatilitySpike,
    StaleData,
}

impl Blocker {
    pub fn id(&self) -> &'static str {
        match self {
            Blocker::DataFailed => "data_failed",
            Blocker::LowConfidence => "low_confidence",
            Blocker::HigherTfDisagree => "higher_tf_disagree",
            Blocker::IndeterminateRegime => "indeterminate_regime",
            Blocker::VolatilitySpike => "volatility_spike",
            Blocker::StaleData => "stale_data",
        }
    }

    const ORDER: [Blocker; 6] = [
        Blocker::DataFailed,
        Blocker::LowConfidence,
        Blocker::HigherTfDisagree,
        Blocker::IndeterminateRegime,
        Blocker::VolatilitySpike,
        Blocker::StaleData,
    ];
}

/// What sizing *would* have produced had the gates passed — kept even when
/// `execution_ready` is `false`, so a blocked run still shows what was left
/// on the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostGatePlan {
    pub allocation: AllocationResult,
    pub hypothetical: bool,
}

/// Outcome of one gate pass over a fused decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEvaluation {
    pub blockers: Vec<Blocker>,
    pub execution_ready: bool,
    pub post_gate: PostGatePlan,
}

impl GateEvaluation {
    pub fn is_blocked_by(&self, blocker: Blocker) -> bool {
        self.blockers.contains(&blocker)
    }
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Evaluate the six gates against a fused decision.
///
/// `tier_health` is the data-freshness state backing each tier's decision;
/// `realized_vol`/`vol_history` feed the volatility-spike gate (spike =
/// `realized_vol` above the configured percentile of trailing history);
/// `raw_weight`/`returns_by_instrument` feed the hypothetical post-gate
/// sizing plan regardless of whether execution is actually allowed.
pub fn evaluate_gates(
    fused: &FusedDecision,
    tier_health: &[DataHealth],
    realized_vol: f64,
    vol_history: &[f64],
    cfg: &GatesConfig,
    raw_weight: f64,
    returns_by_instrument: &[Vec<f64>],
) -> crate::error::Result<GateEvaluation> {
    let mut triggered = Vec::new();

    let data_failed = tier_health.iter().any(|h| *h == DataHealth::Failed);
    if data_failed {
        triggered.push(Blocker::DataFailed);
    }

    if fused.confidence < cfg.confidence_floor {
        triggered.push(Blocker::LowConfidence);
    }

    if fused.higher_tf_disagreement {
        triggered.push(Blocker::HigherTfDisagree);
    }

    if fused.label.base() == RegimeLabel::Indeterminate {
        triggered.push(Blocker::IndeterminateRegime);
    }

    let mut sorted_history: Vec<f64> = vol_history.to_vec();
    sorted_history.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let spike_threshold = percentile(&sorted_history, cfg.volatility_percentile);
    if !sorted_history.is_empty() && realized_vol > spike_threshold {
        triggered.push(Blocker::VolatilitySpike);
    }

    // Spec's `stale_data` gate keys off `fallback` health, not `stale` —
    // `stale` alone (data older than expected but not substituted from a
    // fallback path) is not a listed blocker condition.
    let fallback_data = tier_health.iter().any(|h| *h == DataHealth::Fallback);
    if fallback_data && cfg.strict_mode {
        triggered.push(Blocker::StaleData);
    }

    let mut blockers: Vec<Blocker> = Blocker::ORDER
        .iter()
        .copied()
        .filter(|b| triggered.contains(b))
        .collect();
    blockers.dedup();

    let execution_ready = blockers.is_empty();

    let vol_target_cfg = crate::config::VolTargetConfig::default();
    let allocation = allocate(&[raw_weight], returns_by_instrument, &vol_target_cfg).unwrap_or_else(|e| {
        AllocationResult {
            weights: vec![raw_weight.clamp(vol_target_cfg.min_weight, vol_target_cfg.max_weight)],
            original_weights: vec![raw_weight],
            realized_volatility: 0.0,
            target_volatility: vol_target_cfg.target_volatility,
            scale_factor: 1.0,
            shrinkage_intensity: 0.0,
            condition_number: 0.0,
            observations_used: 0,
            warnings: vec![format!("allocator input error: {e}")],
        }
    });

    Ok(GateEvaluation {
        execution_ready,
        post_gate: PostGatePlan {
            allocation,
            hypothetical: !execution_ready,
        },
        blockers,
    })
}
