//! Cross-component consistency checks.
//!
//! This module only *observes* — it reads the outputs of `features`,
//! `regime`, `fusion`, `gates`, and `sizing` and reports findings. It must
//! never feed back into or mutate any decision; these checks are
//! a contradiction found here is surfaced, not resolved.

use serde::{Deserialize, Serialize};

use crate::features::FeatureBundle;
use crate::fusion::FusedDecision;
use crate::regime::{RegimeDecision, RegimeLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    fn penalty(self) -> f64 {
        match self {
            Severity::Info => 0.05,
            Severity::Warning => 0.15,
            Severity::Critical => 0.35,
        }
    }
}

/// A single consistency rule's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyFinding {
    /// Rule identifier, e.g. `"hurst_vs_label"`.
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub findings: Vec<ConsistencyFinding>,
    /// `1.0` for no findings, decreasing with severity and count, floored at 0.
    pub consistency_score: f64,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }
}

fn hurst_vs_label(decision: &RegimeDecision, features: &FeatureBundle) -> Option<ConsistencyFinding> {
    let h = features.hurst_mean()?;
    match decision.label.base() {
        RegimeLabel::Trending if h < 0.50 => Some(ConsistencyFinding {
            rule: "hurst_vs_label".to_string(),
            severity: Severity::Warning,
            message: format!(
                "{} labeled trending but mean Hurst exponent {:.3} is <= 0.50",
                decision.tier, h
            ),
        }),
        RegimeLabel::MeanReverting if h > 0.50 => Some(ConsistencyFinding {
            rule: "hurst_vs_label".to_string(),
            severity: Severity::Warning,
            message: format!(
                "{} labeled mean_reverting but mean Hurst exponent {:.3} is >= 0.50",
                decision.tier, h
            ),
        }),
        _ => None,
    }
}

fn vr_vs_label(decision: &RegimeDecision, features: &FeatureBundle) -> Option<ConsistencyFinding> {
    let vr = features.vr_statistic?;
    match decision.label.base() {
        RegimeLabel::Trending if vr < 1.0 => Some(ConsistencyFinding {
            rule: "vr_vs_label".to_string(),
            severity: Severity::Warning,
            message: format!(
                "{} labeled trending but variance ratio {:.3} is < 1.0",
                decision.tier, vr
            ),
        }),
        RegimeLabel::MeanReverting if vr > 1.0 => Some(ConsistencyFinding {
            rule: "vr_vs_label".to_string(),
            severity: Severity::Warning,
            message: format!(
                "{} labeled mean_reverting but variance ratio {:.3} is > 1.0",
                decision.tier, vr
            ),
        }),
        _ => None,
    }
}

fn adf_vs_label(decision: &RegimeDecision, features: &FeatureBundle) -> Option<ConsistencyFinding> {
    let p = features.adf_pvalue?;
    if decision.label.base() == RegimeLabel::MeanReverting && p > 0.10 {
        Some(ConsistencyFinding {
            rule: "adf_vs_label".to_string(),
            severity: Severity::Info,
            message: format!(
                "{} labeled mean_reverting but ADF p-value {:.3} does not reject a unit root",
                decision.tier, p
            ),
        })
    } else {
        None
    }
}

fn tier_contradiction(fused: &FusedDecision) -> Option<ConsistencyFinding> {
    if fused.higher_tf_disagreement {
        Some(ConsistencyFinding {
            rule: "tier_contradiction".to_string(),
            severity: Severity::Warning,
            message: "long-term and medium-term tiers disagree on base regime".to_string(),
        })
    } else {
        None
    }
}

fn sizing_vs_gates(gates_blocked: bool, sizing_weight: Option<f64>) -> Option<ConsistencyFinding> {
    match sizing_weight {
        Some(w) if gates_blocked && w.abs() > 1e-9 => Some(ConsistencyFinding {
            rule: "sizing_vs_gates".to_string(),
            severity: Severity::Critical,
            message: format!(
                "risk gates blocked this decision but sizing produced a nonzero weight {w:.4}"
            ),
        }),
        _ => None,
    }
}

/// Run every consistency rule and score the result.
pub fn check_consistency(
    decisions: &[RegimeDecision],
    features: &[FeatureBundle],
    fused: &FusedDecision,
    gates_blocked: bool,
    sizing_weight: Option<f64>,
) -> ConsistencyReport {
    let mut findings = Vec::new();

    for decision in decisions {
        if let Some(f) = features.iter().find(|f| f.tier == decision.tier) {
            findings.extend(hurst_vs_label(decision, f));
            findings.extend(vr_vs_label(decision, f));
            findings.extend(adf_vs_label(decision, f));
        }
    }
    findings.extend(tier_contradiction(fused));
    findings.extend(sizing_vs_gates(gates_blocked, sizing_weight));

    let penalty: f64 = findings.iter().map(|f| f.severity.penalty()).sum();
    let consistency_score = (1.0 - penalty).clamp(0.0, 1.0);

    ConsistencyReport {
        findings,
        consistency_score,
    }
}
