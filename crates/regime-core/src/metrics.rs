//! Backtest performance metrics: 40+ fields computed from
//! a `BacktestResult`'s equity and trade series, including a bootstrap CI on
//! Sharpe via `statistics::block_bootstrap_sharpe`.

use serde::{Deserialize, Serialize};

use crate::backtest::BacktestResult;
use crate::statistics::{block_bootstrap_sharpe, BlockBootstrapConfig};
use crate::strategy::Position;

/// Full performance report for one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub sharpe_ci_low: f64,
    pub sharpe_ci_high: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub omega: f64,
    pub volatility_annualized: f64,
    pub downside_vol: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub ulcer_index: f64,
    pub num_drawdowns: u32,
    pub avg_drawdown: f64,
    pub avg_drawdown_duration: f64,
    pub max_drawdown_duration: u64,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub num_trades: u32,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub avg_trade_duration_bars: f64,
    pub exposure_time: f64,
    pub annual_turnover: f64,
    pub returns_skewness: f64,
    pub returns_kurtosis: f64,
    pub long_trades: u32,
    pub short_trades: u32,
    pub long_win_rate: f64,
    pub short_win_rate: f64,
    /// Buy-and-hold total return over the same bar range, for `alpha`.
    pub baseline_total_return: f64,
    /// `total_return - baseline_total_return`.
    pub alpha: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_return: 0.0,
            cagr: 0.0,
            sharpe: 0.0,
            sharpe_ci_low: 0.0,
            sharpe_ci_high: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            omega: 0.0,
            volatility_annualized: 0.0,
            downside_vol: 0.0,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
            ulcer_index: 0.0,
            num_drawdowns: 0,
            avg_drawdown: 0.0,
            avg_drawdown_duration: 0.0,
            max_drawdown_duration: 0,
            var_95: 0.0,
            var_99: 0.0,
            cvar_95: 0.0,
            num_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            best_trade: 0.0,
            worst_trade: 0.0,
            profit_factor: 0.0,
            expectancy: 0.0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            avg_trade_duration_bars: 0.0,
            exposure_time: 0.0,
            annual_turnover: 0.0,
            returns_skewness: 0.0,
            returns_kurtosis: 0.0,
            long_trades: 0,
            short_trades: 0,
            long_win_rate: 0.0,
            short_win_rate: 0.0,
            baseline_total_return: 0.0,
            alpha: 0.0,
        }
    }
}

fn years_between(result: &BacktestResult) -> f64 {
    if result.equity.len() < 2 {
        return 0.0;
    }
    let first = result.equity.first().unwrap().ts;
    let last = result.equity.last().unwrap().ts;
    last.signed_duration_since(first).num_days() as f64 / 365.25
}

pub fn calculate_cagr(initial: f64, final_value: f64, years: f64) -> f64 {
    if initial <= 0.0 || years <= 0.0 || final_value <= 0.0 {
        return 0.0;
    }
    (final_value / initial).powf(1.0 / years) - 1.0
}

fn mean_std(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

pub fn calculate_sharpe(returns: &[f64], annualization: f64) -> f64 {
    let (mean, std) = mean_std(returns);
    if std < 1e-12 {
        return 0.0;
    }
    (mean / std) * annualization.sqrt()
}

pub fn calculate_sortino(returns: &[f64], annualization: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let downside_variance = returns
        .iter()
        .map(|r| if *r < 0.0 { r.powi(2) } else { 0.0 })
        .sum::<f64>()
        / n;
    let downside_dev = downside_variance.sqrt();
    if downside_dev < 1e-12 {
        return 0.0;
    }
    (mean * annualization) / (downside_dev * annualization.sqrt())
}

/// Fraction of returns above a zero threshold weighted by magnitude, over
/// the fraction below (Omega ratio at a 0% threshold).
pub fn calculate_omega(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
    if losses < 1e-12 {
        if gains > 0.0 {
            f64::INFINITY
        } else {
            1.0
        }
    } else {
        gains / losses
    }
}

/// Drawdown series (as positive fractions) aligned to the equity curve.
fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    let mut peak = equity.first().copied().unwrap_or(1.0);
    equity
        .iter()
        .map(|&e| {
            if e > peak {
                peak = e;
            }
            if peak > 0.0 {
                (peak - e) / peak
            } else {
                0.0
            }
        })
        .collect()
}

pub fn calculate_max_drawdown(equity: &[f64]) -> f64 {
    drawdown_series(equity).into_iter().fold(0.0, f64::max)
}

/// Contiguous drawdown episodes: (depth, duration_in_bars) for each run of
/// strictly-positive drawdown.
fn drawdown_episodes(drawdowns: &[f64]) -> Vec<(f64, u64)> {
    let mut episodes = Vec::new();
    let mut depth = 0.0_f64;
    let mut duration = 0_u64;
    for &dd in drawdowns {
        if dd > 1e-12 {
            depth = depth.max(dd);
            duration += 1;
        } else if duration > 0 {
            episodes.push((depth, duration));
            depth = 0.0;
            duration = 0;
        }
    }
    if duration > 0 {
        episodes.push((depth, duration));
    }
    episodes
}

fn ulcer_index(drawdowns: &[f64]) -> f64 {
    if drawdowns.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = drawdowns.iter().map(|d| d * d).sum();
    (sum_sq / drawdowns.len() as f64).sqrt()
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Value-at-risk and conditional VaR at the given tail probability, both
/// reported as positive loss fractions.
fn var_cvar(returns: &[f64], tail: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let var = -percentile_sorted(&sorted, tail);
    let cutoff = ((sorted.len() as f64) * tail).ceil() as usize;
    let cutoff = cutoff.max(1).min(sorted.len());
    let cvar = -(sorted[..cutoff].iter().sum::<f64>() / cutoff as f64);
    (var.max(0.0), cvar.max(0.0))
}

fn skewness(returns: &[f64]) -> f64 {
    let (mean, std) = mean_std(returns);
    if std < 1e-12 || returns.len() < 3 {
        return 0.0;
    }
    let n = returns.len() as f64;
    returns.iter().map(|r| ((r - mean) / std).powi(3)).sum::<f64>() / n
}

fn kurtosis(returns: &[f64]) -> f64 {
    let (mean, std) = mean_std(returns);
    if std < 1e-12 || returns.len() < 4 {
        return 0.0;
    }
    let n = returns.len() as f64;
    returns.iter().map(|r| ((r - mean) / std).powi(4)).sum::<f64>() / n - 3.0
}

fn max_consecutive(flags: impl Iterator<Item = bool>) -> u32 {
    let mut max_run = 0u32;
    let mut run = 0u32;
    for flag in flags {
        if flag {
            run += 1;
            max_run = max_run.max(run);
        } else {
            run = 0;
        }
    }
    max_run
}

/// Baseline buy-and-hold total return over the same closes, for alpha.
fn baseline_return(closes: &[f64]) -> f64 {
    match (closes.first(), closes.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Compute the full metrics report from a backtest result.
///
/// `sharpe_bootstrap` controls whether the (relatively expensive) Sharpe CI
/// is computed via `block_bootstrap_sharpe`; callers doing many grid-search
/// evaluations typically skip it and only bootstrap the selected winner.
pub fn compute_metrics(
    result: &BacktestResult,
    annualization_factor: f64,
    sharpe_bootstrap: Option<&BlockBootstrapConfig>,
) -> Metrics {
    if result.equity.len() < 2 {
        return Metrics::default();
    }

    let equity_curve: Vec<f64> = result.equity.iter().map(|e| e.equity).collect();
    let closes: Vec<f64> = result.equity.iter().map(|e| e.close).collect();
    let returns = result.returns();

    let initial = equity_curve.first().copied().unwrap_or(1.0);
    let last = equity_curve.last().copied().unwrap_or(1.0);
    let total_return = if initial > 0.0 { last / initial - 1.0 } else { 0.0 };

    let years = years_between(result);
    let cagr = calculate_cagr(initial, last, years);

    let drawdowns = drawdown_series(&equity_curve);
    let max_drawdown = drawdowns.iter().copied().fold(0.0, f64::max);
    let current_drawdown = drawdowns.last().copied().unwrap_or(0.0);
    let episodes = drawdown_episodes(&drawdowns);
    let num_drawdowns = episodes.len() as u32;
    let avg_drawdown = if episodes.is_empty() {
        0.0
    } else {
        episodes.iter().map(|(d, _)| d).sum::<f64>() / episodes.len() as f64
    };
    let avg_drawdown_duration = if episodes.is_empty() {
        0.0
    } else {
        episodes.iter().map(|(_, dur)| *dur as f64).sum::<f64>() / episodes.len() as f64
    };
    let max_drawdown_duration = episodes.iter().map(|(_, dur)| *dur).max().unwrap_or(0);
    let ulcer = ulcer_index(&drawdowns);

    let sharpe = calculate_sharpe(&returns, annualization_factor);
    let sortino = calculate_sortino(&returns, annualization_factor);
    let omega = calculate_omega(&returns);
    let calmar = if max_drawdown > 1e-12 { cagr / max_drawdown } else { 0.0 };

    let (_, std) = mean_std(&returns);
    let volatility_annualized = std * annualization_factor.sqrt();
    let downside_vol = {
        let downside: Vec<f64> = returns.iter().filter(|r| **r < 0.0).copied().collect();
        let (_, dstd) = mean_std(&downside);
        dstd * annualization_factor.sqrt()
    };

    let (var_95, cvar_95) = var_cvar(&returns, 0.05);
    let (var_99, _) = var_cvar(&returns, 0.01);

    let (sharpe_ci_low, sharpe_ci_high) = match sharpe_bootstrap {
        Some(cfg) if returns.len() >= 20 => {
            block_bootstrap_sharpe(&returns, annualization_factor, cfg)
                .map(|r| (r.ci_lower, r.ci_upper))
                .unwrap_or((sharpe, sharpe))
        }
        _ => (sharpe, sharpe),
    };

    let num_trades = result.trades.len() as u32;
    let winning: Vec<f64> = result
        .trades
        .iter()
        .map(|t| t.net_pnl)
        .filter(|p| *p > 0.0)
        .collect();
    let losing: Vec<f64> = result
        .trades
        .iter()
        .map(|t| t.net_pnl)
        .filter(|p| *p < 0.0)
        .collect();
    let win_rate = if num_trades > 0 {
        winning.len() as f64 / num_trades as f64
    } else {
        0.0
    };
    let avg_win = if winning.is_empty() {
        0.0
    } else {
        winning.iter().sum::<f64>() / winning.len() as f64
    };
    let avg_loss = if losing.is_empty() {
        0.0
    } else {
        losing.iter().sum::<f64>() / losing.len() as f64
    };
    let best_trade = result
        .trades
        .iter()
        .map(|t| t.net_pnl)
        .fold(f64::NEG_INFINITY, f64::max);
    let worst_trade = result
        .trades
        .iter()
        .map(|t| t.net_pnl)
        .fold(f64::INFINITY, f64::min);
    let best_trade = if best_trade.is_finite() { best_trade } else { 0.0 };
    let worst_trade = if worst_trade.is_finite() { worst_trade } else { 0.0 };

    let gross_profit: f64 = winning.iter().sum();
    let gross_loss: f64 = losing.iter().map(|p| p.abs()).sum();
    let profit_factor = if gross_loss > 1e-12 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let expectancy = if num_trades > 0 {
        result.trades.iter().map(|t| t.net_pnl).sum::<f64>() / num_trades as f64
    } else {
        0.0
    };

    let max_consecutive_wins = max_consecutive(result.trades.iter().map(|t| t.net_pnl > 0.0));
    let max_consecutive_losses = max_consecutive(result.trades.iter().map(|t| t.net_pnl < 0.0));

    let avg_trade_duration_bars = if num_trades > 0 {
        result.trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / num_trades as f64
    } else {
        0.0
    };

    let bars_exposed = result.equity.iter().filter(|e| e.position_qty.abs() > 1e-12).count();
    let exposure_time = bars_exposed as f64 / result.equity.len() as f64;

    let total_traded: f64 = result.fills.iter().map(|f| f.qty.abs()).sum();
    let annual_turnover = if years > 0.0 { total_traded / years } else { 0.0 };

    let returns_skewness = skewness(&returns);
    let returns_kurtosis = kurtosis(&returns);

    let long_trades = result
        .trades
        .iter()
        .filter(|t| t.direction == Position::Long)
        .count() as u32;
    let short_trades = result
        .trades
        .iter()
        .filter(|t| t.direction == Position::Short)
        .count() as u32;
    let long_win_rate = {
        let longs: Vec<_> = result
            .trades
            .iter()
            .filter(|t| t.direction == Position::Long)
            .collect();
        if longs.is_empty() {
            0.0
        } else {
            longs.iter().filter(|t| t.net_pnl > 0.0).count() as f64 / longs.len() as f64
        }
    };
    let short_win_rate = {
        let shorts: Vec<_> = result
            .trades
            .iter()
            .filter(|t| t.direction == Position::Short)
            .collect();
        if shorts.is_empty() {
            0.0
        } else {
            shorts.iter().filter(|t| t.net_pnl > 0.0).count() as f64 / shorts.len() as f64
        }
    };

    let baseline_total_return = baseline_return(&closes);
    let alpha = total_return - baseline_total_return;

    Metrics {
        total_return,
        cagr,
        sharpe,
        sharpe_ci_low,
        sharpe_ci_high,
        sortino,
        calmar,
        omega,
        volatility_annualized,
        downside_vol,
        max_drawdown,
        current_drawdown,
        ulcer_index: ulcer,
        num_drawdowns,
        avg_drawdown,
        avg_drawdown_duration,
        max_drawdown_duration,
        var_95,
        var_99,
        cvar_95,
        num_trades,
        win_rate,
        avg_win,
        avg_loss,
        best_trade,
        worst_trade,
        profit_factor,
        expectancy,
        max_consecutive_wins,
        max_consecutive_losses,
        avg_trade_duration_bars,
        exposure_time,
        annual_turnover,
        returns_skewness,
        returns_kurtosis,
        long_trades,
        short_trades,
        long_win_rate,
        short_win_rate,
        baseline_total_return,
        alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{run_backtest, Fill, Side};
    use crate::bar::Bar;
    use crate::config::CostBps;
    use chrono::TimeZone;

    fn mk_bar(day: u32, close: f64) -> Bar {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        Bar::new(ts, close, close, close, close, 0.0, "TEST", "1d")
    }

    #[test]
    fn cagr_matches_known_value() {
        let cagr = calculate_cagr(100.0, 200.0, 5.0);
        assert!((cagr - 0.1487).abs() < 0.001);
    }

    #[test]
    fn max_drawdown_matches_known_value() {
        let equity = vec![100.0, 110.0, 105.0, 120.0, 90.0, 100.0];
        let dd = calculate_max_drawdown(&equity);
        assert!((dd - 0.25).abs() < 0.001);
    }

    #[test]
    fn empty_result_yields_default_metrics() {
        let result = BacktestResult {
            fills: vec![],
            trades: vec![],
            equity: vec![],
        };
        let m = compute_metrics(&result, 252.0, None);
        assert_eq!(m.num_trades, 0);
        assert_eq!(m.total_return, 0.0);
    }

    #[test]
    fn uptrend_has_positive_total_return_and_alpha_matches_baseline() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| mk_bar(i as u32 + 1, c))
            .collect();
        let signal = vec![Position::Long; bars.len()];
        let result = run_backtest(&bars, &signal, 1.0, &CostBps::default()).unwrap();
        let m = compute_metrics(&result, 252.0, None);
        assert!(m.total_return > 0.0);
        assert!((m.baseline_total_return - (closes.last().unwrap() / closes[0] - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn win_rate_between_zero_and_one() {
        let result = BacktestResult {
            fills: vec![],
            trades: vec![
                trade(10.0),
                trade(-5.0),
                trade(3.0),
            ],
            equity: vec![
                eq(1, 1.0, 100.0),
                eq(2, 1.05, 105.0),
                eq(3, 1.02, 102.0),
            ],
        };
        let m = compute_metrics(&result, 252.0, None);
        assert!(m.win_rate >= 0.0 && m.win_rate <= 1.0);
        assert_eq!(m.num_trades, 3);
    }

    fn trade(net_pnl: f64) -> crate::backtest::Trade {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fill = Fill {
            ts,
            side: Side::Buy,
            qty: 1.0,
            price: 100.0,
            fees: 0.0,
            raw_price: 100.0,
        };
        crate::backtest::Trade {
            entry: fill.clone(),
            exit: fill,
            direction: Position::Long,
            gross_pnl: net_pnl,
            net_pnl,
            bars_held: 1,
        }
    }

    fn eq(day: u32, equity: f64, close: f64) -> crate::backtest::EquityPoint {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        crate::backtest::EquityPoint {
            ts,
            position_qty: 1.0,
            close,
            equity,
        }
    }
}
