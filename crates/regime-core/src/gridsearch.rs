//! Strategy search and ranking.
//!
//! `strategy.rs` owns what strategies exist and their bounded parameter
//! grids; this module runs each candidate through the backtest kernel and
//! ranks the results — Sharpe first, max drawdown as a tiebreak, parameter
//! count (sparsity) as the final tiebreak among near-identical performers.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::run_backtest;
use crate::bar::Bar;
use crate::config::{BacktestConfig, StrategySearchConfig};
use crate::error::Result;
use crate::metrics::{compute_metrics, Metrics};
use crate::strategy::{parameter_grid, signal_from_bars, StrategySpec, CANONICAL_STRATEGY_IDS};

/// One candidate's backtest outcome, ready to rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub spec: StrategySpec,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchReport {
    /// Best-first: Sharpe descending, then max drawdown ascending (less
    /// negative — shallower drawdown wins), then parameter count ascending.
    pub ranked: Vec<RankedCandidate>,
}

impl GridSearchReport {
    pub fn best(&self) -> Option<&RankedCandidate> {
        self.ranked.first()
    }
}

fn compare_candidates(a: &RankedCandidate, b: &RankedCandidate) -> std::cmp::Ordering {
    b.metrics
        .sharpe
        .partial_cmp(&a.metrics.sharpe)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            b.metrics
                .max_drawdown
                .partial_cmp(&a.metrics.max_drawdown)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| a.spec.parameter_count().cmp(&b.spec.parameter_count()))
}

/// Evaluate every candidate in `candidates` against `bars` and return them
/// ranked. Each candidate's grid is expanded via
/// `strategy::parameter_grid`, bounded by `search_cfg.max_grid_size`.
pub fn rank_candidates(
    bars: &[Bar],
    candidates: &[StrategySpec],
    backtest_cfg: &BacktestConfig,
    search_cfg: &StrategySearchConfig,
    annualization_factor: f64,
) -> Result<GridSearchReport> {
    let expanded: Vec<StrategySpec> = candidates
        .iter()
        .flat_map(|candidate| parameter_grid(candidate.id(), search_cfg.max_grid_size))
        .collect();

    // Each candidate's backtest is independent of every other's, so the
    // grid evaluates in parallel rather than sequentially.
    let mut ranked: Vec<RankedCandidate> = expanded
        .into_par_iter()
        .map(|spec| {
            let signal = signal_from_bars(&spec, bars);
            let result = run_backtest(bars, &signal, 1.0, &backtest_cfg.cost)?;
            let metrics = compute_metrics(&result, annualization_factor, None);
            Ok(RankedCandidate { spec, metrics })
        })
        .collect::<Result<Vec<_>>>()?;

    ranked.sort_by(compare_candidates);

    Ok(GridSearchReport { ranked })
}

/// Run the full nine-strategy registry's grids against `bars`.
/// Convenience wrapper over `rank_candidates` for when the caller has no
/// regime-conditioned family preference yet (fusion confidence narrows the
/// family elsewhere — `orchestrator.rs` calls this per fused decision).
pub fn search_all_strategies(
    bars: &[Bar],
    backtest_cfg: &BacktestConfig,
    search_cfg: &StrategySearchConfig,
    annualization_factor: f64,
) -> Result<GridSearchReport> {
    let candidates: Vec<StrategySpec> = CANONICAL_STRATEGY_IDS
        .iter()
        .flat_map(|id| parameter_grid(id, 1))
        .collect();
    rank_candidates(bars, &candidates, backtest_cfg, search_cfg, annualization_factor)
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
                    .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64);
                Bar::new(ts, c, c * 1.01, c * 0.99, c, 1000.0, "TEST", "1d")
            })
            .collect()
    }

    #[test]
    fn ranked_candidates_are_sorted_by_sharpe_descending() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.3).collect();
        let bars = bars_from_closes(&closes);
        let candidates = vec![
            StrategySpec::MaCross { fast: 5, slow: 20 },
            StrategySpec::CarryHold,
        ];
        let report = rank_candidates(
            &bars,
            &candidates,
            &BacktestConfig::default(),
            &StrategySearchConfig { max_grid_size: 4 },
            252.0,
        )
        .unwrap();
        assert!(!report.ranked.is_empty());
        for pair in report.ranked.windows(2) {
            assert!(pair[0].metrics.sharpe >= pair[1].metrics.sharpe - 1e-9);
        }
    }

    #[test]
    fn max_grid_size_bounds_total_candidates_per_strategy() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.1).sin()).collect();
        let bars = bars_from_closes(&closes);
        let candidates = vec![StrategySpec::BollingerRevert {
            window: 10,
            std_mult: 2.0,
        }];
        let report = rank_candidates(
            &bars,
            &candidates,
            &BacktestConfig::default(),
            &StrategySearchConfig { max_grid_size: 2 },
            252.0,
        )
        .unwrap();
        assert!(report.ranked.len() <= 2);
    }

    #[test]
    fn search_all_strategies_covers_every_canonical_id() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.05).collect();
        let bars = bars_from_closes(&closes);
        let report = search_all_strategies(
            &bars,
            &BacktestConfig::default(),
            &StrategySearchConfig { max_grid_size: 1 },
            252.0,
        )
        .unwrap();
        assert_eq!(report.ranked.len(), CANONICAL_STRATEGY_IDS.len());
    }

    #[test]
    fn best_returns_top_ranked_candidate() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        let report = rank_candidates(
            &bars,
            &[StrategySpec::CarryHold],
            &BacktestConfig::default(),
            &StrategySearchConfig::default(),
            252.0,
        )
        .unwrap();
        assert!(report.best().is_some());
    }
}
