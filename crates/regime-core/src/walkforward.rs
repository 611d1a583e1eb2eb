//! Walk-forward backtesting: expanding/rolling train windows,
//! strategy selection confined to train data, validation-window performance
//! reported with zero re-optimization inside validation (leakage prevention).

use serde::{Deserialize, Serialize};

use crate::backtest::{run_backtest, BacktestResult};
use crate::bar::Bar;
use crate::config::{BacktestConfig, StrategySearchConfig, WalkForwardScheme};
use crate::error::{RegimeError, Result};
use crate::gridsearch::{rank_candidates, GridSearchReport};
use crate::metrics::{compute_metrics, Metrics};
use crate::strategy::{signal_from_bars, StrategySpec};

/// One walk-forward fold's bar index ranges, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardFold {
    pub train_start: usize,
    pub train_end: usize,
    pub validation_start: usize,
    pub validation_end: usize,
}

/// Generate fold boundaries over `n_bars`.
///
/// `Expanding`: train window grows from `train_window` up to however many
/// bars precede each validation slice. `Rolling`: train window stays fixed
/// length, sliding forward with the validation window.
pub fn generate_folds(n_bars: usize, cfg: &BacktestConfig) -> Vec<WalkForwardFold> {
    let mut folds = Vec::new();
    if cfg.train_window == 0 || cfg.validation_window == 0 || n_bars <= cfg.train_window {
        return folds;
    }

    let mut validation_start = cfg.train_window;
    while validation_start + cfg.validation_window <= n_bars {
        let validation_end = validation_start + cfg.validation_window;
        let train_start = match cfg.scheme {
            WalkForwardScheme::Expanding => 0,
            WalkForwardScheme::Rolling => validation_start.saturating_sub(cfg.train_window),
        };
        folds.push(WalkForwardFold {
            train_start,
            train_end: validation_start,
            validation_start,
            validation_end,
        });
        validation_start = validation_end;
    }

    folds
}

/// One fold's outcome: the strategy chosen on train data, and its
/// performance on the (unseen-by-selection) validation slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: WalkForwardFold,
    pub chosen: StrategySpec,
    pub train_metrics: Metrics,
    pub validation_metrics: Metrics,
    /// The validation slice's own fills/trades/equity, kept so the whole
    /// walk-forward can be re-aggregated into one out-of-sample stream
    /// rather than reported fold-by-fold.
    pub validation_result: BacktestResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub folds: Vec<FoldResult>,
}

impl WalkForwardResult {
    /// Stitch every fold's validation slice into one continuous
    /// out-of-sample `BacktestResult`: fills and trades concatenated in
    /// fold order, equity rebased so later folds compound onto the level
    /// the previous fold's validation slice ended at (rather than each
    /// fold restarting its equity curve at 1.0). This is "the concatenated
    /// validation-window returns" spec §4.7 asks metrics to be computed on.
    pub fn stitched_validation_result(&self) -> BacktestResult {
        let mut fills = Vec::new();
        let mut trades = Vec::new();
        let mut equity = Vec::new();
        let mut carry = 1.0_f64;

        for fold in &self.folds {
            let slice = &fold.validation_result;
            fills.extend(slice.fills.iter().cloned());
            trades.extend(slice.trades.iter().cloned());
            let base = slice.equity.first().map(|p| p.equity).unwrap_or(1.0);
            for point in &slice.equity {
                let rebased = if base > 0.0 {
                    carry * (point.equity / base)
                } else {
                    carry
                };
                equity.push(crate::backtest::EquityPoint {
                    ts: point.ts,
                    position_qty: point.position_qty,
                    close: point.close,
                    equity: rebased,
                });
            }
            if let Some(last) = slice.equity.last() {
                if base > 0.0 {
                    carry *= last.equity / base;
                }
            }
        }

        BacktestResult { fills, trades, equity }
    }
}

/// Run walk-forward over `bars` using `candidates` as the strategy universe.
/// Selection happens once per fold on `[train_start, train_end)` only; the
/// selected strategy's signal is then evaluated on
/// `[validation_start, validation_end)` with no further tuning.
pub fn run_walk_forward(
    bars: &[Bar],
    candidates: &[StrategySpec],
    backtest_cfg: &BacktestConfig,
    search_cfg: &StrategySearchConfig,
    annualization_factor: f64,
) -> Result<WalkForwardResult> {
    let folds = generate_folds(bars.len(), backtest_cfg);
    if folds.is_empty() {
        return Err(RegimeError::Config(
            "not enough bars to generate any walk-forward fold".into(),
        ));
    }

    let mut fold_results = Vec::with_capacity(folds.len());

    for fold in &folds {
        let train_bars = &bars[fold.train_start..fold.train_end];
        let report: GridSearchReport = rank_candidates(
            train_bars,
            candidates,
            backtest_cfg,
            search_cfg,
            annualization_factor,
        )?;
        let chosen = report
            .ranked
            .first()
            .map(|r| r.spec.clone())
            .ok_or(RegimeError::GridExhausted)?;

        // Recompute the signal over the full prefix through validation_end so
        // every indicator has proper warmup and no bar depends on data past
        // itself; only the validation slice of the result is scored.
        let prefix_bars = &bars[fold.train_start..fold.validation_end];
        let signal = signal_from_bars(&chosen, prefix_bars);
        let full_result = run_backtest(prefix_bars, &signal, 1.0, &backtest_cfg.cost)?;

        let train_len = fold.train_end - fold.train_start;
        let train_slice = BacktestResult {
            fills: full_result
                .fills
                .iter()
                .filter(|f| prefix_bars[..train_len].iter().any(|b| b.ts == f.ts))
                .cloned()
                .collect(),
            trades: full_result
                .trades
                .iter()
                .filter(|t| prefix_bars[..train_len].iter().any(|b| b.ts == t.exit.ts))
                .cloned()
                .collect(),
            equity: full_result.equity[..train_len].to_vec(),
        };
        let validation_slice = BacktestResult {
            fills: full_result
                .fills
                .iter()
                .filter(|f| prefix_bars[train_len..].iter().any(|b| b.ts == f.ts))
                .cloned()
                .collect(),
            trades: full_result
                .trades
                .iter()
                .filter(|t| prefix_bars[train_len..].iter().any(|b| b.ts == t.exit.ts))
                .cloned()
                .collect(),
            equity: full_result.equity[train_len..].to_vec(),
        };

        fold_results.push(FoldResult {
            fold: *fold,
            chosen,
            train_metrics: compute_metrics(&train_slice, annualization_factor, None),
            validation_metrics: compute_metrics(&validation_slice, annualization_factor, None),
            validation_result: validation_slice,
        });
    }

    Ok(WalkForwardResult {
        folds: fold_results,
    })
}
