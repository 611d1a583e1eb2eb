//! Volatility-target portfolio allocator.
//!
//! Takes each instrument's raw directional weight (from strategy signal
//! times fused confidence, already gated by `gates.rs`) plus a return
//! history per instrument, shrinks the sample covariance matrix
//! (Ledoit-Wolf), scales the raw weight vector to hit a target annualized
//! portfolio volatility, and clamps to configured bounds.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::VolTargetConfig;
use crate::error::{RegimeError, Result};

/// Output of one allocation pass — the `VolatilityTargetDiagnostics` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Final per-instrument weights, bounded to `[min_weight, max_weight]`.
    pub weights: Vec<f64>,
    /// The raw weights this allocation started from, kept alongside the
    /// scaled result so the scaling pass is auditable.
    pub original_weights: Vec<f64>,
    /// Portfolio volatility implied by `weights` and the shrunk covariance,
    /// annualized.
    pub realized_volatility: f64,
    /// The target annualized volatility this allocation scaled toward.
    pub target_volatility: f64,
    /// Scalar applied to the raw weights to hit `target_volatility` before
    /// bounds clamping.
    pub scale_factor: f64,
    /// Ledoit-Wolf shrinkage intensity actually used, in `[0, 1]`.
    pub shrinkage_intensity: f64,
    /// Condition number of the (shrunk) covariance matrix — large values
    /// indicate a near-singular, numerically unstable covariance estimate.
    pub condition_number: f64,
    /// Observation count actually used to estimate the covariance (0 when
    /// degraded to a pass-through).
    pub observations_used: usize,
    /// Human-readable notes: missing per-instrument history, insufficient
    /// observations, a condition-number fallback, or a bounds clamp.
    pub warnings: Vec<String>,
}

/// Sample covariance matrix of `returns` (rows = observations, columns =
/// instruments), unbiased (`N-1`) estimator.
fn sample_covariance(returns: &Array2<f64>) -> Array2<f64> {
    let n = returns.nrows() as f64;
    let means = returns.mean_axis(ndarray::Axis(0)).unwrap();
    let centered = returns - &means.insert_axis(ndarray::Axis(0));
    centered.t().dot(&centered) / (n - 1.0).max(1.0)
}

/// Ledoit-Wolf shrinkage toward a scaled-identity target.
///
/// Shrinks the sample covariance `S` toward `mu * I` (`mu` = average
/// variance), with the shrinkage intensity chosen by the standard
/// Ledoit-Wolf asymptotic formula. Falls back to no shrinkage (`S`
/// unchanged) when there are too few observations to estimate it reliably.
pub fn ledoit_wolf_shrinkage(returns: &Array2<f64>) -> (Array2<f64>, f64) {
    let n = returns.nrows();
    let p = returns.ncols();
    let sample = sample_covariance(returns);

    if n < 2 || p < 2 {
        return (sample, 0.0);
    }

    let mu = sample.diag().sum() / p as f64;
    let mut target = Array2::<f64>::zeros((p, p));
    for i in 0..p {
        target[[i, i]] = mu;
    }

    // Frobenius-norm distance between sample and target, driving the
    // shrinkage intensity numerator.
    let diff = &sample - &target;
    let d2: f64 = diff.iter().map(|x| x * x).sum();

    let means = returns.mean_axis(ndarray::Axis(0)).unwrap();
    let centered = returns - &means.insert_axis(ndarray::Axis(0));

    let mut b2 = 0.0_f64;
    for row in centered.rows() {
        let outer = {
            let col = Array2::from_shape_vec((p, 1), row.to_vec()).unwrap();
            col.dot(&col.t())
        };
        let delta = &outer - &sample;
        b2 += delta.iter().map(|x| x * x).sum::<f64>();
    }
    b2 /= (n * n) as f64;
    let b2 = b2.min(d2);

    let intensity = if d2 > 1e-12 { (b2 / d2).clamp(0.0, 1.0) } else { 0.0 };
    let shrunk = &target * intensity + &sample * (1.0 - intensity);

    (shrunk, intensity)
}

/// Portfolio variance for `weights` under covariance matrix `cov`.
fn portfolio_variance(weights: &Array1<f64>, cov: &Array2<f64>) -> f64 {
    weights.dot(&cov.dot(weights))
}

/// Ratio of largest to smallest eigenvalue magnitude, via the symmetric
/// matrix's trace/determinant-free power-iteration approximation: for the
/// small instrument counts this allocator handles, a cheap proxy (ratio of
/// max to min diagonal after shrinkage) is reported instead of a full
/// eigendecomposition, which `ndarray` alone does not provide.
fn condition_number_proxy(cov: &Array2<f64>) -> f64 {
    let diag = cov.diag();
    let max = diag.iter().cloned().fold(f64::MIN, f64::max);
    let min = diag.iter().cloned().fold(f64::MAX, f64::min);
    if min.abs() < 1e-12 {
        f64::INFINITY
    } else {
        (max / min).abs()
    }
}

/// Degrade to a pass-through allocation: raw weights bounded, zero vol
/// diagnostics, whatever warnings already apply.
fn degrade(
    raw_weights: &[f64],
    cfg: &VolTargetConfig,
    observations_used: usize,
    warnings: Vec<String>,
) -> AllocationResult {
    AllocationResult {
        weights: raw_weights
            .iter()
            .map(|w| w.clamp(cfg.min_weight, cfg.max_weight))
            .collect(),
        original_weights: raw_weights.to_vec(),
        realized_volatility: 0.0,
        target_volatility: cfg.target_volatility,
        scale_factor: 1.0,
        shrinkage_intensity: 0.0,
        condition_number: 0.0,
        observations_used,
        warnings,
    }
}

/// Scale `raw_weights` to hit `target_volatility` (annualized), shrinking the
/// covariance estimated from `returns_by_instrument` (Ledoit-Wolf), then
/// clamp to `[min, max]`.
///
/// Instruments with no return history (an empty series) are excluded from
/// the covariance estimate and retain their raw weight unscaled; the
/// remaining instruments are still scaled against each other. A covariance
/// condition number above `1e8` is treated as numerically unreliable and
/// the estimate falls back to a diagonal-only matrix (instrument variances,
/// no cross terms). Both cases, and an overall observation count below
/// `cfg.min_observations`, are recorded in `warnings`.
pub fn allocate(
    raw_weights: &[f64],
    returns_by_instrument: &[Vec<f64>],
    cfg: &VolTargetConfig,
) -> Result<AllocationResult> {
    if raw_weights.len() != returns_by_instrument.len() {
        return Err(RegimeError::Config(
            "raw_weights length must match number of instruments".into(),
        ));
    }
    if raw_weights.is_empty() {
        return Ok(degrade(raw_weights, cfg, 0, Vec::new()));
    }

    let mut warnings = Vec::new();
    let has_data: Vec<bool> = returns_by_instrument.iter().map(|r| !r.is_empty()).collect();
    for (i, has) in has_data.iter().enumerate() {
        if !has {
            warnings.push(format!(
                "instrument {i} has no return history; weight left unscaled"
            ));
        }
    }

    let data_indices: Vec<usize> = (0..raw_weights.len()).filter(|&i| has_data[i]).collect();
    if data_indices.is_empty() {
        return Ok(degrade(raw_weights, cfg, 0, warnings));
    }

    let n_obs = returns_by_instrument[data_indices[0]].len();
    if data_indices
        .iter()
        .any(|&i| returns_by_instrument[i].len() != n_obs)
    {
        return Err(RegimeError::Config(
            "instruments with return history must share the same observation count".into(),
        ));
    }

    if n_obs < cfg.min_observations {
        warnings.push(format!(
            "observations_used={n_obs} is below min_observations={}; scale_factor left at 1.0",
            cfg.min_observations
        ));
        return Ok(degrade(raw_weights, cfg, n_obs, warnings));
    }

    let p = data_indices.len();
    let mut data = Array2::<f64>::zeros((n_obs, p));
    for (j, &idx) in data_indices.iter().enumerate() {
        for (i, &v) in returns_by_instrument[idx].iter().enumerate() {
            data[[i, j]] = v;
        }
    }

    let (mut cov, shrinkage_intensity) = if cfg.use_shrinkage {
        ledoit_wolf_shrinkage(&data)
    } else {
        (sample_covariance(&data), 0.0)
    };

    let mut condition_number = condition_number_proxy(&cov);
    if condition_number > 1e8 {
        warnings.push(format!(
            "covariance condition number {condition_number:.3e} exceeds 1e8; falling back to a diagonal-only covariance"
        ));
        let diag = cov.diag().to_owned();
        cov = Array2::<f64>::zeros((p, p));
        for i in 0..p {
            cov[[i, i]] = diag[i];
        }
        condition_number = condition_number_proxy(&cov);
    }

    let w_sub = Array1::from_vec(data_indices.iter().map(|&i| raw_weights[i]).collect());
    let raw_variance = portfolio_variance(&w_sub, &cov);
    let raw_vol_annualized = (raw_variance * cfg.annualization_factor).max(0.0).sqrt();

    let scale_factor = if raw_vol_annualized > 1e-9 {
        cfg.target_volatility / raw_vol_annualized
    } else {
        warnings.push("portfolio volatility is ~0; scale_factor left at 1.0".into());
        1.0
    };

    let mut weights = raw_weights.to_vec();
    for &idx in &data_indices {
        let unclamped = raw_weights[idx] * scale_factor;
        let clamped = unclamped.clamp(cfg.min_weight, cfg.max_weight);
        if clamped != unclamped {
            warnings.push(format!(
                "instrument {idx} weight clamped to bounds [{}, {}]",
                cfg.min_weight, cfg.max_weight
            ));
        }
        weights[idx] = clamped;
    }

    let scaled_sub = Array1::from_vec(data_indices.iter().map(|&i| weights[i]).collect());
    let realized_volatility = (portfolio_variance(&scaled_sub, &cov) * cfg.annualization_factor)
        .max(0.0)
        .sqrt();

    Ok(AllocationResult {
        weights,
        original_weights: raw_weights.to_vec(),
        realized_volatility,
        target_volatility: cfg.target_volatility,
        scale_factor,
        shrinkage_intensity,
        condition_number,
        observations_used: n_obs,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VolTargetConfig {
        VolTargetConfig::default()
    }

    #[test]
    fn empty_input_yields_empty_allocation() {
        let result = allocate(&[], &[], &cfg()).unwrap();
        assert!(result.weights.is_empty());
    }

    #[test]
    fn mismatched_lengths_errors() {
        let result = allocate(&[1.0, 0.5], &[vec![0.01; 30]], &cfg());
        assert!(result.is_err());
    }

    #[test]
    fn insufficient_history_passes_through_bounded_weights() {
        let raw = vec![2.0, -2.0];
        let returns = vec![vec![0.01, 0.02], vec![0.01, -0.01]];
        let result = allocate(&raw, &returns, &cfg()).unwrap();
        assert_eq!(result.weights[0], cfg().max_weight);
        assert_eq!(result.weights[1], cfg().min_weight);
        assert_eq!(result.scale_factor, 1.0);
        assert!(!result.warnings.is_empty());
        assert_eq!(result.original_weights, raw);
    }

    #[test]
    fn instrument_with_no_history_retains_raw_weight_while_others_scale() {
        let n = 60;
        let with_data: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 0.02 } else { -0.02 }).collect();
        let raw = vec![1.0, 0.3];
        let returns = vec![with_data, Vec::new()];
        let result = allocate(&raw, &returns, &cfg()).unwrap();
        assert_eq!(result.weights[1], raw[1]);
        assert_ne!(result.weights[0], raw[0]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("instrument 1 has no return history")));
        assert_eq!(result.observations_used, n);
    }

    #[test]
    fn ill_conditioned_covariance_falls_back_to_diagonal_and_warns() {
        let n = 60;
        // Variances nine orders of magnitude apart push the diagonal-ratio
        // condition-number proxy well past the 1e8 fallback threshold.
        let a: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin() * 1.0).collect();
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).cos() * 1e-5).collect();
        let raw = vec![1.0, 1.0];
        let cfg = VolTargetConfig {
            min_observations: 10,
            use_shrinkage: false,
            ..cfg()
        };
        let result = allocate(&raw, &[a, b], &cfg).unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("falling back to a diagonal-only covariance")));
    }

    #[test]
    fn scaling_moves_realized_vol_toward_target() {
        let n = 60;
        let returns_a: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 0.02 } else { -0.02 }).collect();
        let returns_b: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { -0.015 } else { 0.015 }).collect();
        let raw = vec![1.0, 1.0];
        let result = allocate(&raw, &[returns_a, returns_b], &cfg()).unwrap();
        assert!(result.realized_volatility > 0.0);
        assert!((result.realized_volatility - cfg().target_volatility).abs() < 0.5);
    }

    #[test]
    fn ledoit_wolf_shrinkage_intensity_bounded() {
        let data = Array2::from_shape_vec(
            (10, 3),
            vec![
                0.01, 0.02, -0.01, 0.015, -0.005, 0.02, -0.02, 0.01, 0.005, 0.01, 0.0, 0.01, 0.02,
                -0.01, -0.02, -0.01, 0.015, 0.01, 0.005, -0.02, 0.0, 0.01, 0.01, 0.02, -0.015, 0.0,
                -0.01, 0.02, -0.02, 0.01,
            ],
        )
        .unwrap();
        let (_, intensity) = ledoit_wolf_shrinkage(&data);
        assert!((0.0..=1.0).contains(&intensity));
    }

    #[test]
    fn weights_always_within_bounds() {
        let raw = vec![10.0, -10.0, 5.0];
        let returns: Vec<Vec<f64>> = (0..3)
            .map(|_| (0..30).map(|i| 0.001 * (i as f64).sin()).collect())
            .collect();
        let result = allocate(&raw, &returns, &cfg()).unwrap();
        for w in result.weights {
            assert!(w >= cfg().min_weight && w <= cfg().max_weight);
        }
    }
}
