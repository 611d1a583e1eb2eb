//! Unified regime classifier and hysteresis.
//!
//! `classify` is the single scoring function; it is applied twice per run —
//! once per tier for the current decision (with persistence damping layered
//! on top by the caller) and once per window for the rolling label track
//! used by `transitions` (without damping, to avoid the self-referential
//! recursion the design notes call out: damping needs transition metrics,
//! transition metrics need a label history, a label history must not itself
//! depend on damping).

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::features::FeatureBundle;

/// Regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeLabel {
    Trending,
    MeanReverting,
    Indeterminate,
    VolatileTrending,
    VolatileMeanReverting,
}

impl RegimeLabel {
    /// Strip a `volatile_` prefix to compare base regime families, used by
    /// the fusion alignment rules and consistency checks.
    pub fn base(&self) -> RegimeLabel {
        match self {
            RegimeLabel::VolatileTrending => RegimeLabel::Trending,
            RegimeLabel::VolatileMeanReverting => RegimeLabel::MeanReverting,
            other => *other,
        }
    }

    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            RegimeLabel::VolatileTrending | RegimeLabel::VolatileMeanReverting
        )
    }

    fn with_volatile_prefix(base: RegimeLabel) -> RegimeLabel {
        match base {
            RegimeLabel::Trending => RegimeLabel::VolatileTrending,
            RegimeLabel::MeanReverting => RegimeLabel::VolatileMeanReverting,
            other => other,
        }
    }
}

/// Per-component contribution to the classifier score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentContributions {
    pub hurst: f64,
    pub vr: f64,
    pub adf: f64,
}

/// A tier's regime decision. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDecision {
    pub tier: String,
    pub label: RegimeLabel,
    pub raw_confidence: f64,
    pub effective_confidence: f64,
    pub score: f64,
    pub component_contributions: ComponentContributions,
    pub rationale: String,
}

/// Result of the bare scoring step, before persistence damping is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredLabel {
    pub label: RegimeLabel,
    pub raw_confidence: f64,
    pub score: f64,
    pub contributions: ComponentContributions,
}

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.clamp(lo, hi)
}

/// Piecewise-linear map of `H̄` to `[-1, +1]`.
fn hurst_component(h_bar: f64) -> f64 {
    if h_bar <= 0.40 {
        -1.0
    } else if h_bar >= 0.60 {
        1.0
    } else if h_bar <= 0.50 {
        (h_bar - 0.50) / 0.10
    } else {
        (h_bar - 0.50) / 0.10
    }
}

/// Piecewise-linear map of VR to `[-1, +1]`, pivot 1.0, shrunk toward 0 when
/// the VR p-value exceeds 0.10.
fn vr_component(vr: f64, vr_pvalue: f64) -> f64 {
    let raw = if vr <= 0.85 {
        -1.0
    } else if vr >= 1.15 {
        1.0
    } else if vr <= 1.0 {
        (vr - 1.0) / 0.15
    } else {
        (vr - 1.0) / 0.15
    };
    if vr_pvalue > 0.10 {
        raw * 0.5
    } else {
        raw
    }
}

/// Mean-reverting-leaning map of ADF p-value to `[-0.5, 0]`.
fn adf_component(adf_pvalue: f64) -> f64 {
    if adf_pvalue < 0.05 {
        -0.5
    } else {
        0.0
    }
}

/// Score the three components and classify into a base label (before the
/// `volatile_` prefix and before persistence damping).
pub fn classify(features: &FeatureBundle, cfg: &ClassifierConfig) -> Option<ScoredLabel> {
    if features.feature_insufficient {
        return None;
    }

    let h_bar = features.hurst_mean()?;
    let vr = features.vr_statistic?;
    let vr_p = features.vr_pvalue?;
    let adf_p = features.adf_pvalue?;

    let hurst_c = clip(hurst_component(h_bar), -1.0, 1.0);
    let vr_c = clip(vr_component(vr, vr_p), -1.0, 1.0);
    let adf_c = clip(adf_component(adf_p), -1.0, 1.0);

    let score = cfg.weight_hurst * hurst_c + cfg.weight_vr * vr_c + cfg.weight_adf * adf_c;
    let score = clip(score, -1.0, 1.0);

    let (label, raw_confidence) = if score >= cfg.score_threshold {
        (RegimeLabel::Trending, clip(0.5 + score / 2.0, 0.60, 0.80))
    } else if score <= -cfg.score_threshold {
        (
            RegimeLabel::MeanReverting,
            clip(0.5 + score.abs() / 2.0, 0.60, 0.80),
        )
    } else {
        (RegimeLabel::Indeterminate, clip(0.5 - score.abs(), 0.0, 0.50))
    };

    Some(ScoredLabel {
        label,
        raw_confidence,
        score,
        contributions: ComponentContributions {
            hurst: hurst_c,
            vr: vr_c,
            adf: adf_c,
        },
    })
}

/// Apply the `volatile_` prefix when realized vol exceeds the configured
/// percentile of its rolling history.
pub fn apply_volatility_prefix(
    label: RegimeLabel,
    realized_vol: f64,
    vol_history: &[f64],
    percentile: f64,
) -> RegimeLabel {
    if vol_history.is_empty() || matches!(label, RegimeLabel::Indeterminate) {
        return label;
    }
    let mut sorted = vol_history.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f64 - 1.0) * percentile).round() as usize;
    let threshold = sorted[idx.min(sorted.len() - 1)];
    if realized_vol > threshold {
        RegimeLabel::with_volatile_prefix(label)
    } else {
        label
    }
}

/// Persistence damping:
/// `effective_confidence = raw_confidence · (1 − flip_density) · (1 − entropy_norm)`.
pub fn apply_persistence_damping(raw_confidence: f64, flip_density: f64, entropy_norm: f64) -> f64 {
    let damped = raw_confidence * (1.0 - flip_density) * (1.0 - entropy_norm);
    clip(damped, 0.0, raw_confidence)
}

/// Build the full `RegimeDecision` for one tier: score, classify, prefix,
/// then damp.
#[allow(clippy::too_many_arguments)]
pub fn build_decision(
    tier: &str,
    features: &FeatureBundle,
    cfg: &ClassifierConfig,
    vol_history: &[f64],
    flip_density: f64,
    entropy_norm: f64,
) -> RegimeDecision {
    let Some(scored) = classify(features, cfg) else {
        return RegimeDecision {
            tier: tier.to_string(),
            label: RegimeLabel::Indeterminate,
            raw_confidence: 0.0,
            effective_confidence: 0.0,
            score: 0.0,
            component_contributions: ComponentContributions {
                hurst: 0.0,
                vr: 0.0,
                adf: 0.0,
            },
            rationale: "feature_insufficient".to_string(),
        };
    };

    let realized_vol = features.realized_vol_annualized.unwrap_or(0.0);
    let label = apply_volatility_prefix(
        scored.label,
        realized_vol,
        vol_history,
        cfg.volatility_percentile,
    );
    let effective_confidence =
        apply_persistence_damping(scored.raw_confidence, flip_density, entropy_norm);

    let rationale = format!(
        "score={:.3} (hurst={:.2}, vr={:.2}, adf={:.2}); flip_density={:.2}, entropy_norm={:.2}",
        scored.score,
        scored.contributions.hurst,
        scored.contributions.vr,
        scored.contributions.adf,
        flip_density,
        entropy_norm
    );

    RegimeDecision {
        tier: tier.to_string(),
        label,
        raw_confidence: scored.raw_confidence,
        effective_confidence,
        score: scored.score,
        component_contributions: scored.contributions,
        rationale,
    }
}

/// Hysteresis / stability filter for the rolling-label track, requiring
/// `m_bars` consecutive
/// windows of a new label before it is accepted.
///
/// Grounded in the "stability filter" idiom: stick with the current label
/// unless the new one has been observed `m_bars` times running.
#[derive(Debug, Clone)]
pub struct HysteresisFilter {
    current: RegimeLabel,
    candidate: Option<RegimeLabel>,
    candidate_streak: usize,
    m_bars: usize,
}

impl HysteresisFilter {
    /// Initial state is always `indeterminate`.
    pub fn new(m_bars: usize) -> Self {
        Self {
            current: RegimeLabel::Indeterminate,
            candidate: None,
            candidate_streak: 0,
            m_bars: m_bars.max(1),
        }
    }

    /// Feed the next window's raw (undamped) label; returns the confirmed
    /// label after hysteresis.
    pub fn push(&mut self, new_label: RegimeLabel) -> RegimeLabel {
        if new_label == self.current {
            self.candidate = None;
            self.candidate_streak = 0;
            return self.current;
        }

        match self.candidate {
            Some(c) if c == new_label => {
                self.candidate_streak += 1;
            }
            _ => {
                self.candidate = Some(new_label);
                self.candidate_streak = 1;
            }
        }

        if self.candidate_streak >= self.m_bars {
            self.current = new_label;
            self.candidate = None;
            self.candidate_streak = 0;
        }

        self.current
    }

    pub fn current(&self) -> RegimeLabel {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(hurst: f64, vr: f64, vr_p: f64, adf_p: f64) -> FeatureBundle {
        FeatureBundle {
            tier: "MT".to_string(),
            hurst_rs: Some(hurst),
            hurst_dfa: Some(hurst),
            vr_statistic: Some(vr),
            vr_pvalue: Some(vr_p),
            adf_statistic: Some(-1.0),
            adf_pvalue: Some(adf_p),
            acf_lag1: Some(0.0),
            realized_vol_annualized: Some(0.15),
            sample_size: 400,
            ci_lower_hurst: Some(hurst - 0.05),
            ci_upper_hurst: Some(hurst + 0.05),
            feature_insufficient: false,
        }
    }

    #[test]
    fn trending_series_classifies_trending() {
        let f = bundle(0.70, 1.30, 0.02, 0.5);
        let cfg = ClassifierConfig::default();
        let scored = classify(&f, &cfg).unwrap();
        assert_eq!(scored.label, RegimeLabel::Trending);
        assert!(scored.raw_confidence >= 0.60 && scored.raw_confidence <= 0.80);
    }

    #[test]
    fn mean_reverting_series_classifies_mean_reverting() {
        let f = bundle(0.30, 0.70, 0.02, 0.01);
        let cfg = ClassifierConfig::default();
        let scored = classify(&f, &cfg).unwrap();
        assert_eq!(scored.label, RegimeLabel::MeanReverting);
    }

    #[test]
    fn ambiguous_series_is_indeterminate() {
        let f = bundle(0.50, 1.0, 0.5, 0.5);
        let cfg = ClassifierConfig::default();
        let scored = classify(&f, &cfg).unwrap();
        assert_eq!(scored.label, RegimeLabel::Indeterminate);
        assert!(scored.raw_confidence <= 0.50);
    }

    #[test]
    fn feature_insufficient_returns_none() {
        let mut f = bundle(0.7, 1.3, 0.02, 0.5);
        f.feature_insufficient = true;
        let cfg = ClassifierConfig::default();
        assert!(classify(&f, &cfg).is_none());
    }

    #[test]
    fn persistence_damping_never_increases_confidence() {
        let eff = apply_persistence_damping(0.80, 0.10, 0.20);
        assert!(eff <= 0.80);
        assert!((eff - 0.80 * 0.90 * 0.80).abs() < 1e-9);
    }

    #[test]
    fn damping_monotone_in_flip_density_and_entropy() {
        let base = apply_persistence_damping(0.80, 0.10, 0.10);
        let more_flips = apply_persistence_damping(0.80, 0.30, 0.10);
        let more_entropy = apply_persistence_damping(0.80, 0.10, 0.30);
        assert!(more_flips < base);
        assert!(more_entropy < base);
    }

    #[test]
    fn volatility_prefix_applied_above_percentile() {
        let history = vec![0.10, 0.12, 0.14, 0.16, 0.18, 0.20];
        let label = apply_volatility_prefix(RegimeLabel::Trending, 0.25, &history, 0.90);
        assert_eq!(label, RegimeLabel::VolatileTrending);
    }

    #[test]
    fn volatility_prefix_not_applied_to_indeterminate() {
        let history = vec![0.10, 0.12, 0.14];
        let label = apply_volatility_prefix(RegimeLabel::Indeterminate, 0.50, &history, 0.50);
        assert_eq!(label, RegimeLabel::Indeterminate);
    }

    #[test]
    fn hysteresis_requires_m_bars_confirmation() {
        let mut filter = HysteresisFilter::new(3);
        assert_eq!(filter.current(), RegimeLabel::Indeterminate);

        assert_eq!(filter.push(RegimeLabel::Trending), RegimeLabel::Indeterminate);
        assert_eq!(filter.push(RegimeLabel::Trending), RegimeLabel::Indeterminate);
        assert_eq!(filter.push(RegimeLabel::Trending), RegimeLabel::Trending);
    }

    #[test]
    fn hysteresis_resets_streak_on_interruption() {
        let mut filter = HysteresisFilter::new(2);
        filter.push(RegimeLabel::Trending);
        // Interrupted by a different candidate before confirmation.
        filter.push(RegimeLabel::MeanReverting);
        assert_eq!(filter.current(), RegimeLabel::Indeterminate);
        filter.push(RegimeLabel::MeanReverting);
        assert_eq!(filter.current(), RegimeLabel::MeanReverting);
    }

    #[test]
    fn hysteresis_sticky_once_confirmed() {
        let mut filter = HysteresisFilter::new(1);
        filter.push(RegimeLabel::Trending);
        assert_eq!(filter.current(), RegimeLabel::Trending);
        // A single off-label window does not immediately flip back.
        filter.push(RegimeLabel::Indeterminate);
        assert_eq!(filter.current(), RegimeLabel::Indeterminate);
    }

    #[test]
    fn base_strips_volatile_prefix() {
        assert_eq!(RegimeLabel::VolatileTrending.base(), RegimeLabel::Trending);
        assert_eq!(
            RegimeLabel::VolatileMeanReverting.base(),
            RegimeLabel::MeanReverting
        );
        assert!(RegimeLabel::VolatileTrending.is_volatile());
        assert!(!RegimeLabel::Trending.is_volatile());
    }
}
