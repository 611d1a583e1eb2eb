//! Run configuration: the full set of knobs a pipeline run accepts.
//!
//! Every `Default` here mirrors a concrete value for tier bar sizes,
//! classifier weights, cost bps, and gate thresholds; `validate()` follows
//! the same pattern as `statistics::BootstrapConfig::validate`: reject
//! out-of-range values up front rather than let them silently propagate
//! into NaNs.

use serde::{Deserialize, Serialize};

use crate::error::{RegimeError, Result};

/// One tier's bar-series parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name, e.g. "LT", "MT", "ST".
    pub name: String,
    /// Bar size label, e.g. "1d", "4h", "15m".
    pub bar_size: String,
    /// Lookback window requested from the data loader, in days.
    pub lookback_days: u32,
    /// Annualization factor for realized volatility on this tier.
    pub annualization_factor: f64,
    /// Hysteresis confirmation window (consecutive windows of a new label
    /// required before the rolling track accepts it).
    pub m_bars: usize,
    /// Minimum bar count required before features are computed.
    pub min_observations: usize,
    /// Maximum allowed gap between consecutive bars, in multiples of
    /// `bar_size`, before the series is considered to have a data gap.
    pub max_gap_multiple: f64,
}

impl TierConfig {
    pub fn long_term() -> Self {
        Self {
            name: "LT".into(),
            bar_size: "1d".into(),
            lookback_days: 1500,
            annualization_factor: 252.0,
            m_bars: 2,
            min_observations: 300,
            max_gap_multiple: 3.0,
        }
    }

    pub fn medium_term() -> Self {
        Self {
            name: "MT".into(),
            bar_size: "4h".into(),
            lookback_days: 250,
            annualization_factor: 252.0 * 6.0,
            m_bars: 2,
            min_observations: 300,
            max_gap_multiple: 3.0,
        }
    }

    pub fn short_term() -> Self {
        Self {
            name: "ST".into(),
            bar_size: "15m".into(),
            lookback_days: 60,
            annualization_factor: 252.0 * 26.0,
            m_bars: 3,
            min_observations: 300,
            max_gap_multiple: 3.0,
        }
    }
}

/// Classifier weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub score_threshold: f64,
    pub weight_hurst: f64,
    pub weight_vr: f64,
    pub weight_adf: f64,
    /// Rolling history length (in windows) used by transition metrics.
    pub rolling_track_windows: usize,
    /// Percentile of the rolling realized-vol history above which a label
    /// is prefixed `volatile_`.
    pub volatility_percentile: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.10,
            weight_hurst: 0.40,
            weight_vr: 0.40,
            weight_adf: 0.20,
            rolling_track_windows: 200,
            volatility_percentile: 0.90,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        let sum = self.weight_hurst + self.weight_vr + self.weight_adf;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(RegimeError::Config(format!(
                "classifier weights must sum to 1.0, got {sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(RegimeError::Config(
                "score_threshold must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Tier-weighted fusion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub weight_lt: f64,
    pub weight_mt: f64,
    pub weight_st: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weight_lt: 0.30,
            weight_mt: 0.50,
            weight_st: 0.20,
        }
    }
}

/// Cost model applied per unit of turnover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBps {
    pub spread_bps: f64,
    pub slippage_bps: f64,
    pub fee_bps: f64,
}

impl Default for CostBps {
    fn default() -> Self {
        Self {
            spread_bps: 5.0,
            slippage_bps: 3.0,
            fee_bps: 2.0,
        }
    }
}

impl CostBps {
    pub fn total_bps(&self) -> f64 {
        self.spread_bps + self.slippage_bps + self.fee_bps
    }
}

/// Walk-forward window scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkForwardScheme {
    /// Training window grows with each fold.
    Expanding,
    /// Training window slides forward, fixed length.
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub train_window: usize,
    pub validation_window: usize,
    pub scheme: WalkForwardScheme,
    pub cost: CostBps,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            train_window: 400,
            validation_window: 80,
            scheme: WalkForwardScheme::Rolling,
            cost: CostBps::default(),
        }
    }
}

/// Risk gate thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatesConfig {
    pub confidence_floor: f64,
    pub strict_mode: bool,
    pub volatility_percentile: f64,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.50,
            strict_mode: false,
            volatility_percentile: 0.99,
        }
    }
}

/// Volatility-target allocator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolTargetConfig {
    pub enabled: bool,
    pub target_volatility: f64,
    pub lookback_days: usize,
    pub min_observations: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    pub use_shrinkage: bool,
    pub annualization_factor: f64,
}

impl Default for VolTargetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_volatility: 0.15,
            lookback_days: 30,
            min_observations: 20,
            min_weight: -1.0,
            max_weight: 1.0,
            use_shrinkage: true,
            annualization_factor: 252.0,
        }
    }
}

/// Strategy-grid cap shared across regimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategySearchConfig {
    pub max_grid_size: usize,
}

impl Default for StrategySearchConfig {
    fn default() -> Self {
        Self { max_grid_size: 256 }
    }
}

/// The full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub tiers: Vec<TierConfig>,
    pub classifier: ClassifierConfig,
    pub fusion: FusionConfig,
    pub strategy_search: StrategySearchConfig,
    pub backtest: BacktestConfig,
    pub gates: GatesConfig,
    pub vol_target: VolTargetConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierConfig::long_term(),
                TierConfig::medium_term(),
                TierConfig::short_term(),
            ],
            classifier: ClassifierConfig::default(),
            fusion: FusionConfig::default(),
            strategy_search: StrategySearchConfig::default(),
            backtest: BacktestConfig::default(),
            gates: GatesConfig::default(),
            vol_target: VolTargetConfig::default(),
        }
    }
}

impl RunConfig {
    /// Validate cross-field invariants that a single struct's `Default`
    /// cannot enforce on its own (mirrors `BootstrapConfig::validate`).
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;

        if self.tiers.is_empty() {
            return Err(RegimeError::Config("tiers must not be empty".into()));
        }

        let weight_sum =
            self.fusion.weight_lt + self.fusion.weight_mt + self.fusion.weight_st;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(RegimeError::Config(format!(
                "fusion weights must sum to 1.0, got {weight_sum}"
            )));
        }

        if !(0.0..=1.0).contains(&self.gates.confidence_floor) {
            return Err(RegimeError::Config(
                "confidence_floor must be in [0, 1]".into(),
            ));
        }

        if self.vol_target.min_weight > self.vol_target.max_weight {
            return Err(RegimeError::Config(
                "vol_target.min_weight must be <= max_weight".into(),
            ));
        }

        if self.strategy_search.max_grid_size == 0 {
            return Err(RegimeError::Config(
                "strategy_search.max_grid_size must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn tier(&self, name: &str) -> Option<&TierConfig> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn classifier_weights_must_sum_to_one() {
        let mut cfg = ClassifierConfig::default();
        cfg.weight_hurst = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fusion_weights_must_sum_to_one() {
        let mut cfg = RunConfig::default();
        cfg.fusion.weight_mt = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn vol_target_bounds_must_be_ordered() {
        let mut cfg = RunConfig::default();
        cfg.vol_target.min_weight = 0.5;
        cfg.vol_target.max_weight = 0.1;
        assert!(cfg.validate().is_err());
    }
}
