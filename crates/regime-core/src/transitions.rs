//! Transition metrics derived from a rolling regime-label track.
//!
//! The rolling track itself is produced by applying `regime::classify` (and
//! `apply_volatility_prefix`, but deliberately *not* `apply_persistence_damping`)
//! over a sliding window of recent history — damping
//! is applied only to the current decision, never to the history used to
//! measure how often the regime flips.

use serde::{Deserialize, Serialize};

use crate::regime::RegimeLabel;

/// The five states the transition matrix tracks over.
const STATES: [RegimeLabel; 5] = [
    RegimeLabel::Trending,
    RegimeLabel::MeanReverting,
    RegimeLabel::Indeterminate,
    RegimeLabel::VolatileTrending,
    RegimeLabel::VolatileMeanReverting,
];

fn state_index(label: RegimeLabel) -> usize {
    STATES.iter().position(|s| *s == label).unwrap_or(2)
}

/// Transition metrics over a tier's rolling label track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetrics {
    /// Fraction of consecutive windows whose label differs, in `[0, 1]`.
    pub flip_density: f64,
    /// Median length, in windows, of a same-label run.
    pub median_duration_bars: u64,
    /// Shannon entropy of the observed transition matrix, in `[0, ln 5]`.
    pub entropy: f64,
    /// `entropy` normalized by `ln(number of distinct states observed)`, in `[0, 1]`.
    pub entropy_norm: f64,
    /// Mean realized vol at flip points divided by mean realized vol overall;
    /// `1.0` when there are no flips or no vol history to compare against.
    pub vol_ratio_at_flips: f64,
}

impl TransitionMetrics {
    /// The degenerate metrics for an empty or single-point track: no flips,
    /// no entropy, neutral vol ratio.
    fn trivial() -> Self {
        Self {
            flip_density: 0.0,
            median_duration_bars: 0,
            entropy: 0.0,
            entropy_norm: 0.0,
            vol_ratio_at_flips: 1.0,
        }
    }
}

fn run_lengths(track: &[RegimeLabel]) -> Vec<u64> {
    let mut runs = Vec::new();
    let mut current = track[0];
    let mut len: u64 = 1;
    for &label in &track[1..] {
        if label == current {
            len += 1;
        } else {
            runs.push(len);
            current = label;
            len = 1;
        }
    }
    runs.push(len);
    runs
}

fn median(mut values: Vec<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2
    } else {
        values[mid]
    }
}

/// Compute transition metrics over a rolling label track, optionally paired
/// with a realized-vol series of the same length (one value per window).
pub fn compute_transition_metrics(
    track: &[RegimeLabel],
    vol_at_window: Option<&[f64]>,
) -> TransitionMetrics {
    if track.len() < 2 {
        return TransitionMetrics::trivial();
    }

    let n_transitions = track.len() - 1;
    let flips: Vec<usize> = (0..n_transitions)
        .filter(|&i| track[i] != track[i + 1])
        .collect();
    let flip_density = flips.len() as f64 / n_transitions as f64;

    let median_duration_bars = median(run_lengths(track));

    let mut counts = [[0u64; 5]; 5];
    for i in 0..n_transitions {
        let from = state_index(track[i]);
        let to = state_index(track[i + 1]);
        counts[from][to] += 1;
    }
    let total: u64 = counts.iter().flatten().sum();
    let mut entropy = 0.0_f64;
    if total > 0 {
        for row in &counts {
            for &c in row {
                if c > 0 {
                    let p = c as f64 / total as f64;
                    entropy -= p * p.ln();
                }
            }
        }
    }

    let distinct_states = {
        let mut seen = std::collections::HashSet::new();
        for &l in track {
            seen.insert(state_index(l));
        }
        seen.len().max(2)
    };
    let max_entropy = (distinct_states as f64).ln();
    let entropy_norm = if max_entropy > 0.0 {
        (entropy / max_entropy).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let vol_ratio_at_flips = match vol_at_window {
        Some(vols) if vols.len() == track.len() && !flips.is_empty() => {
            let overall_mean: f64 = vols.iter().sum::<f64>() / vols.len() as f64;
            if overall_mean <= 0.0 {
                1.0
            } else {
                let flip_mean: f64 = flips
                    .iter()
                    .map(|&i| vols[i + 1])
                    .sum::<f64>()
                    / flips.len() as f64;
                flip_mean / overall_mean
            }
        }
        _ => 1.0,
    };

    TransitionMetrics {
        flip_density,
        median_duration_bars,
        entropy,
        entropy_norm,
        vol_ratio_at_flips,
    }
}
