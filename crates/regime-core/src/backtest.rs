//! Single-strategy backtest kernel.
//!
//! Consumes a pre-computed `Position` signal (see `strategy::signal_from_bars`)
//! rather than owning a stateful `Strategy` trait itself — `walkforward.rs`
//! recomputes the signal per fold and calls this module once per fold.
//!
//! Fill convention: the signal computed on bar `t`'s close fills at bar
//! `t+1`'s open (shift-by-one, no lookahead). Position size is the
//! strategy's directional sign scaled by a caller-supplied confidence
//! factor — constant for the run, since per-bar position sizing is the
//! volatility-target allocator's job (`sizing.rs`), not this kernel's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bar::Bar;
use crate::config::CostBps;
use crate::error::{RegimeError, Result};
use crate::strategy::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ts: DateTime<Utc>,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub fees: f64,
    pub raw_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry: Fill,
    pub exit: Fill,
    pub direction: Position,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub bars_held: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub position_qty: f64,
    pub close: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub fills: Vec<Fill>,
    pub trades: Vec<Trade>,
    pub equity: Vec<EquityPoint>,
}

impl BacktestResult {
    pub fn last_equity(&self) -> Option<f64> {
        self.equity.last().map(|p| p.equity)
    }

    pub fn returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .map(|w| w[1].equity / w[0].equity - 1.0)
            .collect()
    }
}

/// `qty` is a fraction of NAV (the strategy's directional weight), not a
/// share count, so fees and slippage are both expressed as fractions of
/// NAV rather than scaled by the raw asset price.
fn execute_fill(ts: DateTime<Utc>, side: Side, qty: f64, raw_price: f64, cost: &CostBps) -> Fill {
    let slip_rate = (cost.spread_bps + cost.slippage_bps) / 10_000.0;
    let slipped_price = match side {
        Side::Buy => raw_price * (1.0 + slip_rate),
        Side::Sell => raw_price * (1.0 - slip_rate),
    };
    let fees = qty.abs() * (cost.fee_bps / 10_000.0);

    Fill {
        ts,
        side,
        qty,
        price: slipped_price,
        fees,
        raw_price,
    }
}

/// Trade PnL is expressed as a fractional return scaled by the position's
/// weight, consistent with the equity curve's NAV-fraction accounting.
fn close_trade(entry: Fill, exit: Fill, direction: Position, bars_held: usize) -> Trade {
    let price_return = match direction {
        Position::Long => exit.price / entry.price - 1.0,
        Position::Short => entry.price / exit.price - 1.0,
        Position::Flat => 0.0,
    };
    let gross_pnl = price_return * entry.qty.abs();
    let net_pnl = gross_pnl - entry.fees - exit.fees;
    Trade {
        entry,
        exit,
        direction,
        gross_pnl,
        net_pnl,
        bars_held,
    }
}

/// Run a single-strategy backtest. `signal[i]` is the position
/// decided on bar `i`'s close; it is executed at bar `i+1`'s open. The
/// `initial_cash` at `bars[0]` is marked flat.
pub fn run_backtest(
    bars: &[Bar],
    signal: &[Position],
    confidence_scale: f64,
    cost: &CostBps,
) -> Result<BacktestResult> {
    if bars.len() != signal.len() {
        return Err(RegimeError::Strategy(format!(
            "signal length {} does not match bar count {}",
            signal.len(),
            bars.len()
        )));
    }
    if bars.is_empty() {
        return Ok(BacktestResult {
            fills: Vec::new(),
            trades: Vec::new(),
            equity: Vec::new(),
        });
    }

    let mut fills = Vec::new();
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(bars.len());

    let mut position_qty = 0.0_f64;
    let mut position_dir = Position::Flat;
    let mut current_entry: Option<(Fill, usize)> = None;

    equity.push(EquityPoint {
        ts: bars[0].ts,
        position_qty: 0.0,
        close: bars[0].close,
        equity: 1.0,
    });

    for i in 1..bars.len() {
        let target_dir = signal[i - 1];
        let target_qty = target_dir.sign() * confidence_scale;

        if (target_qty - position_qty).abs() > 1e-12 {
            if position_qty.abs() > 1e-12 {
                let side = if position_dir == Position::Long {
                    Side::Sell
                } else {
                    Side::Buy
                };
                let exit_fill = execute_fill(bars[i].ts, side, position_qty, bars[i].open, cost);
                if let Some((entry, entry_idx)) = current_entry.take() {
                    trades.push(close_trade(entry, exit_fill.clone(), position_dir, i - entry_idx));
                }
                fills.push(exit_fill);
                position_qty = 0.0;
                position_dir = Position::Flat;
            }

            if target_qty.abs() > 1e-12 {
                let side = if target_dir == Position::Long {
                    Side::Buy
                } else {
                    Side::Sell
                };
                let entry_fill = execute_fill(bars[i].ts, side, target_qty, bars[i].open, cost);
                fills.push(entry_fill.clone());
                current_entry = Some((entry_fill, i));
                position_qty = target_qty;
                position_dir = target_dir;
            }
        }

        let fees_this_bar: f64 = fills
            .iter()
            .rev()
            .take_while(|f| f.ts == bars[i].ts)
            .map(|f| f.fees)
            .sum();

        let bar_return = bars[i].close / bars[i - 1].close - 1.0;
        let equity_level =
            equity[i - 1].equity * (1.0 + position_qty * bar_return - fees_this_bar);

        equity.push(EquityPoint {
            ts: bars[i].ts,
            position_qty,
            close: bars[i].close,
            equity: equity_level,
        });
    }

    // Close any residual open position at the final bar's close so trade
    // accounting doesn't silently drop an in-progress position.
    if let Some((entry, entry_idx)) = current_entry.take() {
        let last = bars.len() - 1;
        let side = if position_dir == Position::Long {
            Side::Sell
        } else {
            Side::Buy
        };
        let exit_fill = execute_fill(bars[last].ts, side, position_qty, bars[last].close, cost);
        trades.push(close_trade(entry, exit_fill.clone(), position_dir, last - entry_idx));
        fills.push(exit_fill);
    }

    Ok(BacktestResult {
        fills,
        trades,
        equity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mk_bar(day: u32, open: f64, close: f64) -> Bar {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        Bar::new(ts, open, open.max(close), open.min(close), close, 0.0, "TEST", "1d")
    }

    #[test]
    fn flat_signal_produces_no_trades() {
        let bars = vec![mk_bar(1, 10.0, 10.0), mk_bar(2, 10.0, 10.0), mk_bar(3, 10.0, 10.0)];
        let signal = vec![Position::Flat; 3];
        let result = run_backtest(&bars, &signal, 1.0, &CostBps::default()).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.fills.is_empty());
    }

    #[test]
    fn long_signal_enters_at_next_open() {
        let bars = vec![
            mk_bar(1, 10.0, 10.0),
            mk_bar(2, 20.0, 20.0),
            mk_bar(3, 30.0, 30.0),
        ];
        let signal = vec![Position::Long, Position::Long, Position::Flat];
        let result = run_backtest(&bars, &signal, 1.0, &CostBps::default()).unwrap();
        // signal[0] decided at bar 0 close, fills at bar 1 open = 20.0
        assert!((result.fills[0].raw_price - 20.0).abs() < 1e-9);
        assert_eq!(result.fills[0].side, Side::Buy);
    }

    #[test]
    fn short_signal_produces_sell_entry() {
        let bars = vec![
            mk_bar(1, 10.0, 10.0),
            mk_bar(2, 20.0, 20.0),
            mk_bar(3, 10.0, 10.0),
        ];
        let signal = vec![Position::Short, Position::Short, Position::Flat];
        let result = run_backtest(&bars, &signal, 1.0, &CostBps::default()).unwrap();
        assert_eq!(result.fills[0].side, Side::Sell);
        let trade = &result.trades[0];
        assert_eq!(trade.direction, Position::Short);
        assert!(trade.gross_pnl > 0.0); // shorted at 20, covered at 10
    }

    #[test]
    fn mismatched_lengths_errors() {
        let bars = vec![mk_bar(1, 10.0, 10.0)];
        let signal = vec![Position::Long, Position::Flat];
        assert!(run_backtest(&bars, &signal, 1.0, &CostBps::default()).is_err());
    }

    #[test]
    fn residual_open_position_closed_at_final_bar() {
        let bars = vec![
            mk_bar(1, 10.0, 10.0),
            mk_bar(2, 20.0, 20.0),
            mk_bar(3, 30.0, 30.0),
        ];
        let signal = vec![Position::Long, Position::Long, Position::Long];
        let result = run_backtest(&bars, &signal, 1.0, &CostBps::default()).unwrap();
        assert_eq!(result.trades.len(), 1);
    }

    #[test]
    fn costs_reduce_net_pnl_below_gross() {
        let bars = vec![
            mk_bar(1, 10.0, 10.0),
            mk_bar(2, 20.0, 20.0),
            mk_bar(3, 30.0, 30.0),
        ];
        let signal = vec![Position::Long, Position::Flat, Position::Flat];
        let cost = CostBps {
            spread_bps: 10.0,
            slippage_bps: 10.0,
            fee_bps: 10.0,
        };
        let result = run_backtest(&bars, &signal, 1.0, &cost).unwrap();
        let trade = &result.trades[0];
        assert!(trade.net_pnl < trade.gross_pnl);
    }
}
