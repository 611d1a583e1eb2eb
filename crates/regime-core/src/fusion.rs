//! Multi-tier fusion: combine per-tier `RegimeDecision`s into one fused call
//! across long/medium/short tiers.
//!
//! MT is always the primary decision; LT and ST only adjust its confidence.
//! The multipliers below are literal, named constants — not a
//! continuous "alignment fraction" approximation — because S5's worked
//! example (`0.65 · 0.90 = 0.585`) pins the exact arithmetic.

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::regime::{RegimeDecision, RegimeLabel};

/// How the fused confidence was derived, for the report's audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionCase {
    /// `LT == MT == ST`: no penalty.
    FullAlignment,
    /// `MT == ST`, `LT` differs: `× 0.90`.
    MtStAgree,
    /// `MT` disagrees with `ST` (or `LT`): `× 0.75`.
    Disagreement,
    /// All three tiers carry distinct labels: clamped to `≤ 0.50`.
    ThreeWaySplit,
    /// Fewer than all three tiers were available to fuse.
    Degraded,
}

/// The fused cross-tier decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDecision {
    /// Always MT's label — MT is the primary decision.
    pub label: RegimeLabel,
    pub confidence: f64,
    pub case: FusionCase,
    /// `true` when LT and MT carry strictly opposed base labels (one
    /// `trending`, the other `mean_reverting`, ignoring the `volatile_`
    /// prefix) — the "higher timeframe disagree" signal `gates.rs` keys
    /// off of (spec §4.8 blocker #3).
    pub higher_tf_disagreement: bool,
    pub fusion_note: String,
    pub per_tier: Vec<RegimeDecision>,
}

fn find_tier<'a>(decisions: &'a [RegimeDecision], tier: &str) -> Option<&'a RegimeDecision> {
    decisions.iter().find(|d| d.tier == tier)
}

/// Fuse per-tier decisions into one. `cfg` is accepted for
/// forward compatibility with configurable tier weights even though the
/// literal rule below is fixed regardless of tier weighting — the weights
/// only matter if a future revision blends confidences instead of
/// multiplying MT's.
pub fn fuse(decisions: &[RegimeDecision], _cfg: &FusionConfig) -> FusedDecision {
    let mt = find_tier(decisions, "MT");
    let lt = find_tier(decisions, "LT");
    let st = find_tier(decisions, "ST");

    let Some(mt) = mt else {
        return FusedDecision {
            label: RegimeLabel::Indeterminate,
            confidence: 0.0,
            case: FusionCase::Degraded,
            higher_tf_disagreement: false,
            fusion_note: "no MT decision available; fusion degraded to indeterminate".to_string(),
            per_tier: decisions.to_vec(),
        };
    };

    let higher_tf_disagreement = match lt {
        Some(lt) => {
            let (a, b) = (lt.label.base(), mt.label.base());
            matches!(
                (a, b),
                (RegimeLabel::Trending, RegimeLabel::MeanReverting)
                    | (RegimeLabel::MeanReverting, RegimeLabel::Trending)
            )
        }
        None => false,
    };

    let (confidence, case, note) = match (lt, st) {
        (Some(lt), Some(st)) => {
            if lt.label == mt.label && st.label == mt.label {
                (
                    mt.effective_confidence,
                    FusionCase::FullAlignment,
                    "LT, MT, and ST agree; no penalty".to_string(),
                )
            } else if st.label == mt.label {
                (
                    mt.effective_confidence * 0.90,
                    FusionCase::MtStAgree,
                    "MT and ST agree, LT differs; confidence ×0.90".to_string(),
                )
            } else {
                let distinct = {
                    let mut labels = [lt.label, mt.label, st.label];
                    labels.sort_by_key(|l| format!("{l:?}"));
                    labels.windows(2).filter(|w| w[0] != w[1]).count() + 1
                };
                if distinct >= 3 {
                    (
                        mt.effective_confidence.min(0.50),
                        FusionCase::ThreeWaySplit,
                        "LT, MT, ST carry three distinct labels; clamped to ≤ 0.50".to_string(),
                    )
                } else {
                    (
                        mt.effective_confidence * 0.75,
                        FusionCase::Disagreement,
                        "MT disagrees with ST or LT; confidence ×0.75".to_string(),
                    )
                }
            }
        }
        _ => (
            mt.effective_confidence * 0.75,
            FusionCase::Degraded,
            "LT or ST decision missing; fusion degraded with a ×0.75 penalty".to_string(),
        ),
    };

    FusedDecision {
        label: mt.label,
        confidence: confidence.clamp(0.0, 1.0),
        case,
        higher_tf_disagreement,
        fusion_note: note,
        per_tier: decisions.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::ComponentContributions;

    fn decision(tier: &str, label: RegimeLabel, confidence: f64) -> RegimeDecision {
        RegimeDecision {
            tier: tier.to_string(),
            label,
            raw_confidence: confidence,
            effective_confidence: confidence,
            score: 0.0,
            component_contributions: ComponentContributions {
                hurst: 0.0,
                vr: 0.0,
                adf: 0.0,
            },
            rationale: String::new(),
        }
    }

    #[test]
    fn full_alignment_keeps_mt_confidence_unchanged() {
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.70),
            decision("MT", RegimeLabel::Trending, 0.65),
            decision("ST", RegimeLabel::Trending, 0.60),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert_eq!(fused.label, RegimeLabel::Trending);
        assert_eq!(fused.case, FusionCase::FullAlignment);
        assert!((fused.confidence - 0.65).abs() < 1e-9);
        assert!(!fused.higher_tf_disagreement);
    }

    #[test]
    fn mt_st_agree_lt_differs_applies_090_multiplier() {
        // Seed scenario S5: LT=trending@0.80, MT=mean_reverting@0.65, ST=mean_reverting@0.60.
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.80),
            decision("MT", RegimeLabel::MeanReverting, 0.65),
            decision("ST", RegimeLabel::MeanReverting, 0.60),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert_eq!(fused.label, RegimeLabel::MeanReverting);
        assert_eq!(fused.case, FusionCase::MtStAgree);
        assert!((fused.confidence - 0.65 * 0.90).abs() < 1e-9);
        assert!(fused.higher_tf_disagreement);
    }

    #[test]
    fn mt_disagrees_with_st_applies_075_multiplier() {
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.70),
            decision("MT", RegimeLabel::Trending, 0.70),
            decision("ST", RegimeLabel::MeanReverting, 0.70),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert_eq!(fused.case, FusionCase::Disagreement);
        assert!((fused.confidence - 0.70 * 0.75).abs() < 1e-9);
        // LT agrees with MT (both trending); the disagreement is MT vs ST,
        // which is not what `higher_tf_disagreement` tracks.
        assert!(!fused.higher_tf_disagreement);
    }

    #[test]
    fn higher_tf_disagreement_compares_lt_to_mt_not_lt_to_st() {
        // LT and ST are opposed, but LT agrees with MT: spec §4.8 blocker #3
        // is keyed on LT vs MT, so this must NOT flag.
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.70),
            decision("MT", RegimeLabel::Trending, 0.65),
            decision("ST", RegimeLabel::MeanReverting, 0.60),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert!(!fused.higher_tf_disagreement);
    }

    #[test]
    fn higher_tf_disagreement_requires_strictly_opposed_labels() {
        // LT is indeterminate, MT is trending: different but not "opposed"
        // (trending vs mean_reverting) — must not flag.
        let decisions = vec![
            decision("LT", RegimeLabel::Indeterminate, 0.40),
            decision("MT", RegimeLabel::Trending, 0.65),
            decision("ST", RegimeLabel::Trending, 0.60),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert!(!fused.higher_tf_disagreement);
    }

    #[test]
    fn three_distinct_labels_clamp_to_half() {
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.90),
            decision("MT", RegimeLabel::MeanReverting, 0.90),
            decision("ST", RegimeLabel::Indeterminate, 0.90),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert_eq!(fused.case, FusionCase::ThreeWaySplit);
        assert!(fused.confidence <= 0.50 + 1e-9);
    }

    #[test]
    fn missing_mt_degrades_to_indeterminate() {
        let decisions = vec![decision("LT", RegimeLabel::Trending, 0.70)];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert_eq!(fused.label, RegimeLabel::Indeterminate);
        assert_eq!(fused.confidence, 0.0);
    }

    #[test]
    fn confidence_never_exceeds_one() {
        let decisions = vec![
            decision("LT", RegimeLabel::Trending, 0.95),
            decision("MT", RegimeLabel::Trending, 0.95),
            decision("ST", RegimeLabel::Trending, 0.95),
        ];
        let fused = fuse(&decisions, &FusionConfig::default());
        assert!(fused.confidence <= 1.0);
    }
}
