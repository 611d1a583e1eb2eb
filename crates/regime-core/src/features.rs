//! Statistical features computed per tier from a bar series.
//!
//! Every statistic is a pure function of log-returns (or, for ADF, the price
//! series itself); nothing here performs IO. `feature_insufficient` is an
//! edge policy, not an error: callers below `min_observations` get a bundle
//! of `None`s rather than a propagated failure or a silently substituted
//! default.

use serde::{Deserialize, Serialize};

use crate::bar::{log_returns, Bar};
use crate::statistics::{block_bootstrap_ci, standard_normal_cdf, BlockBootstrapConfig};

/// R/S window sizes used by both the Hurst R/S and DFA estimators.
const HURST_WINDOW_SIZES: [usize; 4] = [10, 20, 50, 100];

/// Lags used by the Lo-MacKinlay variance ratio test.
const VR_LAGS: [usize; 4] = [2, 4, 8, 16];

/// Per-tier statistical feature bundle.
///
/// All fields are `None` together when `feature_insufficient` is set;
/// partial presence (one statistic missing, others set) never occurs because
/// every estimator below is computed from the same `log_returns(bars)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub tier: String,
    pub hurst_rs: Option<f64>,
    pub hurst_dfa: Option<f64>,
    pub vr_statistic: Option<f64>,
    pub vr_pvalue: Option<f64>,
    pub adf_statistic: Option<f64>,
    pub adf_pvalue: Option<f64>,
    pub acf_lag1: Option<f64>,
    pub realized_vol_annualized: Option<f64>,
    pub sample_size: usize,
    pub ci_lower_hurst: Option<f64>,
    pub ci_upper_hurst: Option<f64>,
    pub feature_insufficient: bool,
}

impl FeatureBundle {
    fn insufficient(tier: impl Into<String>, sample_size: usize) -> Self {
        Self {
            tier: tier.into(),
            hurst_rs: None,
            hurst_dfa: None,
            vr_statistic: None,
            vr_pvalue: None,
            adf_statistic: None,
            adf_pvalue: None,
            acf_lag1: None,
            realized_vol_annualized: None,
            sample_size,
            ci_lower_hurst: None,
            ci_upper_hurst: None,
            feature_insufficient: true,
        }
    }

    /// Mean of the two Hurst estimators, `H̄`.
    pub fn hurst_mean(&self) -> Option<f64> {
        match (self.hurst_rs, self.hurst_dfa) {
            (Some(rs), Some(dfa)) => Some((rs + dfa) / 2.0),
            _ => None,
        }
    }
}

/// Compute the full feature bundle for one tier's bar series.
///
/// `min_observations` and `annualization_factor` come from that tier's
/// `TierConfig`. Bootstrap B=500.
pub fn compute_features(
    bars: &[Bar],
    tier: &str,
    min_observations: usize,
    annualization_factor: f64,
) -> FeatureBundle {
    if bars.len() < min_observations {
        return FeatureBundle::insufficient(tier, bars.len());
    }

    let returns = log_returns(bars);
    if returns.len() < min_observations {
        return FeatureBundle::insufficient(tier, bars.len());
    }

    let prices: Vec<f64> = bars.iter().map(|b| b.close).filter(|c| *c > 0.0).collect();

    let hurst_rs = hurst_rs_exponent(&returns);
    let hurst_dfa = hurst_dfa_exponent(&returns);
    let (vr_statistic, vr_pvalue) = variance_ratio(&returns);
    let (adf_statistic, adf_pvalue) = adf_test(&prices);
    let acf_lag1 = autocorrelation_lag1(&returns);
    let realized_vol_annualized = Some(realized_volatility(&returns, annualization_factor));

    let (ci_lower_hurst, ci_upper_hurst) = hurst_rs
        .map(|_| hurst_confidence_interval(&returns))
        .unwrap_or((None, None));

    FeatureBundle {
        tier: tier.to_string(),
        hurst_rs,
        hurst_dfa,
        vr_statistic,
        vr_pvalue,
        adf_statistic,
        adf_pvalue,
        acf_lag1,
        realized_vol_annualized,
        sample_size: returns.len(),
        ci_lower_hurst,
        ci_upper_hurst,
        feature_insufficient: false,
    }
}

/// Winsorize a slice at the 1st/99th percentile, returning a new vector.
fn winsorize(data: &[f64]) -> Vec<f64> {
    if data.len() < 4 {
        return data.to_vec();
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let lo_idx = ((sorted.len() as f64) * 0.01).floor() as usize;
    let hi_idx = (((sorted.len() as f64) * 0.99).ceil() as usize).min(sorted.len() - 1);
    let lo = sorted[lo_idx];
    let hi = sorted[hi_idx];
    data.iter().map(|&x| x.clamp(lo, hi)).collect()
}

/// R/S statistic for one contiguous chunk of returns.
fn rescaled_range(chunk: &[f64]) -> Option<f64> {
    let n = chunk.len();
    if n < 2 {
        return None;
    }
    let mean = chunk.iter().sum::<f64>() / n as f64;
    let mut cum = 0.0;
    let mut max_dev = f64::NEG_INFINITY;
    let mut min_dev = f64::INFINITY;
    for &x in chunk {
        cum += x - mean;
        max_dev = max_dev.max(cum);
        min_dev = min_dev.min(cum);
    }
    let range = max_dev - min_dev;
    let variance = chunk.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();
    if std_dev < 1e-12 {
        None
    } else {
        Some(range / std_dev)
    }
}

/// OLS slope of `log(y)` on `log(x)` over paired samples.
fn log_log_slope(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let xs: Vec<f64> = pairs.iter().map(|(x, _)| x.ln()).collect();
    let ys: Vec<f64> = pairs.iter().map(|(_, y)| y.ln()).collect();
    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let cov: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let var: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if var < 1e-12 {
        None
    } else {
        Some(cov / var)
    }
}

/// Hurst exponent via classical rescaled-range analysis.
///
/// Winsorizes returns at the 1st/99th percentile, computes R/S averaged over
/// non-overlapping chunks at each window size in `HURST_WINDOW_SIZES`, then
/// regresses `log(R/S)` on `log(n)`; the slope is the estimator.
pub fn hurst_rs_exponent(returns: &[f64]) -> Option<f64> {
    let clean = winsorize(returns);
    let mut pairs = Vec::new();

    for &n in HURST_WINDOW_SIZES.iter() {
        if clean.len() < n {
            continue;
        }
        let chunks: Vec<&[f64]> = clean.chunks(n).filter(|c| c.len() == n).collect();
        if chunks.is_empty() {
            continue;
        }
        let rs_values: Vec<f64> = chunks.iter().filter_map(|c| rescaled_range(c)).collect();
        if rs_values.is_empty() {
            continue;
        }
        let avg_rs = rs_values.iter().sum::<f64>() / rs_values.len() as f64;
        if avg_rs > 0.0 {
            pairs.push((n as f64, avg_rs));
        }
    }

    log_log_slope(&pairs).map(|h| h.clamp(0.0, 1.0))
}

/// Hurst exponent via detrended fluctuation analysis.
///
/// Integrates (de-meaned, cumulatively summed) returns, fits a local linear
/// trend per window and measures the RMS residual `F(n)`, then regresses
/// `log(F(n))` on `log(n)`.
pub fn hurst_dfa_exponent(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let mut profile = Vec::with_capacity(returns.len());
    let mut cum = 0.0;
    for &r in returns {
        cum += r - mean;
        profile.push(cum);
    }

    let mut pairs = Vec::new();
    for &n in HURST_WINDOW_SIZES.iter() {
        if profile.len() < n {
            continue;
        }
        let segments: Vec<&[f64]> = profile.chunks(n).filter(|c| c.len() == n).collect();
        if segments.is_empty() {
            continue;
        }
        let mut sq_residual_sum = 0.0;
        let mut count = 0usize;
        for seg in &segments {
            if let Some(f2) = detrended_variance(seg) {
                sq_residual_sum += f2;
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let f_n = (sq_residual_sum / count as f64).sqrt();
        if f_n > 0.0 {
            pairs.push((n as f64, f_n));
        }
    }

    log_log_slope(&pairs).map(|h| h.clamp(0.0, 1.0))
}

/// Mean squared residual of `segment` around its best-fit line (OLS).
fn detrended_variance(segment: &[f64]) -> Option<f64> {
    let n = segment.len();
    if n < 2 {
        return None;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = segment.iter().sum::<f64>() / n as f64;
    let cov: f64 = xs
        .iter()
        .zip(segment.iter())
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let var: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if var < 1e-12 {
        return None;
    }
    let slope = cov / var;
    let intercept = y_mean - slope * x_mean;
    let mse = xs
        .iter()
        .zip(segment.iter())
        .map(|(x, y)| {
            let fitted = slope * x + intercept;
            (y - fitted).powi(2)
        })
        .sum::<f64>()
        / n as f64;
    Some(mse)
}

/// Lag-`k` sample autocorrelation of `returns`.
fn autocorrelation(returns: &[f64], k: usize) -> f64 {
    let n = returns.len();
    if n <= k {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let denom: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum();
    if denom < 1e-15 {
        return 0.0;
    }
    let numer: f64 = (0..n - k)
        .map(|i| (returns[i] - mean) * (returns[i + k] - mean))
        .sum();
    numer / denom
}

/// Lag-1 sample autocorrelation of returns.
pub fn autocorrelation_lag1(returns: &[f64]) -> Option<f64> {
    if returns.len() < 3 {
        return None;
    }
    Some(autocorrelation(returns, 1))
}

/// Lo-MacKinlay variance ratio for a single lag `k`, heteroskedasticity-robust.
///
/// Returns `(vr, z_statistic)`. `vr` is the ratio of the `k`-period variance
/// to `k` times the 1-period variance; `z` is the asymptotically standard
/// normal test statistic under the heteroskedasticity-robust variant.
fn variance_ratio_at_lag(returns: &[f64], k: usize) -> Option<(f64, f64)> {
    let n = returns.len();
    if n <= k * 2 {
        return None;
    }
    let nf = n as f64;
    let mean = returns.iter().sum::<f64>() / nf;

    // 1-period variance.
    let var_1: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / nf;
    if var_1 < 1e-15 {
        return None;
    }

    // k-period overlapping variance of sums.
    let sums_k: Vec<f64> = (0..=n - k)
        .map(|i| returns[i..i + k].iter().sum::<f64>())
        .collect();
    let mean_k = k as f64 * mean;
    let var_k: f64 = sums_k.iter().map(|s| (s - mean_k).powi(2)).sum::<f64>()
        / (sums_k.len() as f64 * k as f64);

    let vr = var_k / var_1;

    // Heteroskedasticity-robust asymptotic variance (Lo-MacKinlay 1988, eq. 14).
    let delta_sum: f64 = (1..k)
        .map(|j| {
            let weight = 2.0 * (k - j) as f64 / k as f64;
            let autocov_num: f64 = (j..n)
                .map(|t| (returns[t] - mean).powi(2) * (returns[t - j] - mean).powi(2))
                .sum();
            let denom = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / nf).powi(2);
            weight.powi(2) * (autocov_num / nf) / denom.max(1e-15)
        })
        .sum();

    let se = delta_sum.max(1e-15).sqrt();
    let z = (vr - 1.0) / se;
    Some((vr, z))
}

/// Aggregate variance-ratio statistic and p-value across `VR_LAGS`.
///
/// The reported statistic is the mean VR across lags; the p-value is derived
/// from the mean of the per-lag z-statistics via the normal CDF (two-sided).
pub fn variance_ratio(returns: &[f64]) -> (Option<f64>, Option<f64>) {
    let results: Vec<(f64, f64)> = VR_LAGS
        .iter()
        .filter_map(|&k| variance_ratio_at_lag(returns, k))
        .collect();

    if results.is_empty() {
        return (None, None);
    }

    let vr_mean = results.iter().map(|(vr, _)| vr).sum::<f64>() / results.len() as f64;
    let z_mean = results.iter().map(|(_, z)| z).sum::<f64>() / results.len() as f64;
    let p_value = 2.0 * (1.0 - standard_normal_cdf(z_mean.abs()));

    (Some(vr_mean), Some(p_value.clamp(0.0, 1.0)))
}

/// Augmented Dickey-Fuller test (no lag augmentation, no trend).
///
/// Regresses `Δy_t = α + β·y_{t-1} + ε_t` by OLS; the ADF statistic is the
/// t-statistic on `β`. The p-value is approximated from MacKinnon (1994)
/// critical-value response-surface anchors for the no-trend case via linear
/// interpolation between tabulated (statistic, p-value) pairs.
pub fn adf_test(prices: &[f64]) -> (Option<f64>, Option<f64>) {
    if prices.len() < 10 {
        return (None, None);
    }

    let y: Vec<f64> = prices.to_vec();
    let n = y.len() - 1;
    let dy: Vec<f64> = (1..y.len()).map(|t| y[t] - y[t - 1]).collect();
    let y_lag: Vec<f64> = y[..y.len() - 1].to_vec();

    // OLS of dy on [1, y_lag]: beta = cov(y_lag, dy) / var(y_lag), centered.
    let y_lag_mean = y_lag.iter().sum::<f64>() / n as f64;
    let dy_mean = dy.iter().sum::<f64>() / n as f64;

    let cov: f64 = y_lag
        .iter()
        .zip(dy.iter())
        .map(|(yl, d)| (yl - y_lag_mean) * (d - dy_mean))
        .sum();
    let var: f64 = y_lag.iter().map(|yl| (yl - y_lag_mean).powi(2)).sum();

    if var < 1e-12 {
        return (None, None);
    }

    let beta = cov / var;
    let alpha = dy_mean - beta * y_lag_mean;

    let residuals: Vec<f64> = y_lag
        .iter()
        .zip(dy.iter())
        .map(|(yl, d)| d - (alpha + beta * yl))
        .collect();
    let sse: f64 = residuals.iter().map(|e| e.powi(2)).sum();
    let dof = (n as f64 - 2.0).max(1.0);
    let sigma2 = sse / dof;
    let se_beta = (sigma2 / var).sqrt();

    if se_beta < 1e-15 {
        return (None, None);
    }

    let t_stat = beta / se_beta;
    (Some(t_stat), Some(adf_pvalue_approx(t_stat)))
}

/// MacKinnon (1994) no-trend critical-value anchors, interpolated linearly.
fn adf_pvalue_approx(t_stat: f64) -> f64 {
    // (statistic, one-sided p-value) anchors for the no-constant-trend case.
    const ANCHORS: [(f64, f64); 7] = [
        (-3.75, 0.01),
        (-3.00, 0.05),
        (-2.60, 0.10),
        (-1.95, 0.50),
        (-1.30, 0.80),
        (-0.60, 0.95),
        (0.50, 0.999),
    ];

    if t_stat <= ANCHORS[0].0 {
        return ANCHORS[0].1;
    }
    if t_stat >= ANCHORS[ANCHORS.len() - 1].0 {
        return ANCHORS[ANCHORS.len() - 1].1;
    }
    for w in ANCHORS.windows(2) {
        let (x0, p0) = w[0];
        let (x1, p1) = w[1];
        if t_stat >= x0 && t_stat <= x1 {
            let frac = (t_stat - x0) / (x1 - x0);
            return (p0 + frac * (p1 - p0)).clamp(0.0, 1.0);
        }
    }
    0.5
}

/// Annualized realized volatility.
pub fn realized_volatility(returns: &[f64], annualization_factor: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    variance.sqrt() * annualization_factor.sqrt()
}

/// Stationary block-bootstrap 95% CI for the Hurst R/S exponent, B=500,
/// block length `sqrt(N)`.
fn hurst_confidence_interval(returns: &[f64]) -> (Option<f64>, Option<f64>) {
    let block_len = (returns.len() as f64).sqrt().max(2.0);
    let config = BlockBootstrapConfig {
        base: crate::statistics::BootstrapConfig {
            n_iterations: 500,
            confidence_level: 0.95,
            seed: 42,
            use_bca: false,
        },
        method: crate::statistics::BootstrapMethod::Stationary {
            expected_block_length: block_len,
        },
    };

    let statistic_fn = |sample: &[f64]| hurst_rs_exponent(sample).unwrap_or(0.5);

    match block_bootstrap_ci(returns, statistic_fn, &config) {
        Ok(result) => (Some(result.ci_lower), Some(result.ci_upper)),
        Err(_) => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = chrono::Utc
                    .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64);
                Bar::new(ts, c, c, c, c, 1000.0, "TEST", "1d")
            })
            .collect()
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut price = 100.0;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            price *= 1.0 + rng.gen_range(-0.01..0.01);
            out.push(price);
        }
        out
    }

    #[test]
    fn insufficient_sample_yields_all_none() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        let bundle = compute_features(&bars, "LT", 300, 252.0);
        assert!(bundle.feature_insufficient);
        assert!(bundle.hurst_rs.is_none());
        assert!(bundle.vr_statistic.is_none());
    }

    #[test]
    fn sufficient_sample_populates_bundle() {
        let closes = random_walk(400, 7);
        let bars = bars_from_closes(&closes);
        let bundle = compute_features(&bars, "LT", 300, 252.0);
        assert!(!bundle.feature_insufficient);
        assert!(bundle.hurst_rs.unwrap() >= 0.0 && bundle.hurst_rs.unwrap() <= 1.0);
        assert!(bundle.hurst_dfa.unwrap() >= 0.0 && bundle.hurst_dfa.unwrap() <= 1.0);
        assert!(bundle.vr_statistic.unwrap() >= 0.0);
        let p = bundle.vr_pvalue.unwrap();
        assert!((0.0..=1.0).contains(&p));
        let adf_p = bundle.adf_pvalue.unwrap();
        assert!((0.0..=1.0).contains(&adf_p));
    }

    #[test]
    fn realized_vol_is_nonnegative() {
        let closes = random_walk(400, 11);
        let bars = bars_from_closes(&closes);
        let bundle = compute_features(&bars, "MT", 300, 252.0 * 6.0);
        assert!(bundle.realized_vol_annualized.unwrap() >= 0.0);
    }

    #[test]
    fn trending_series_has_high_hurst() {
        // Strong persistent drift: close[i] = close[i-1] * 1.002 with tiny noise.
        let mut closes = Vec::with_capacity(400);
        let mut price = 100.0;
        for _ in 0..400 {
            price *= 1.002;
            closes.push(price);
        }
        let bars = bars_from_closes(&closes);
        let bundle = compute_features(&bars, "LT", 300, 252.0);
        // A near-deterministic drift is not mean reverting.
        assert!(bundle.hurst_rs.unwrap() > 0.4);
    }

    #[test]
    fn acf_lag1_bounded() {
        let closes = random_walk(400, 3);
        let bars = bars_from_closes(&closes);
        let returns = log_returns(&bars);
        let acf = autocorrelation_lag1(&returns).unwrap();
        assert!((-1.0..=1.0).contains(&acf));
    }

    #[test]
    fn hurst_ci_lower_le_upper() {
        let closes = random_walk(350, 99);
        let bars = bars_from_closes(&closes);
        let bundle = compute_features(&bars, "LT", 300, 252.0);
        if let (Some(lower), Some(upper)) = (bundle.ci_lower_hurst, bundle.ci_upper_hurst) {
            assert!(lower <= upper);
        }
    }
}
