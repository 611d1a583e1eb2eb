//! Strategy registry: the nine canonical strategies and their bounded
//! parameter grids.
//!
//! Every strategy is a pure function from a bar series to a per-bar
//! `Position` signal — no state beyond what each strategy's own loop
//! tracks internally (Donchian breakout and the revert strategies are
//! stateful in the sense that they hold a position until an opposing
//! signal fires; that state lives entirely inside `signal_from_bars`).

use serde::{Deserialize, Serialize};

use crate::bar::Bar;
use crate::indicators::{
    atr_wilder, bollinger_bands, donchian_channel, ema_close, keltner_channel, macd, rsi, sma_close,
};

/// A strategy's directional call for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Long,
    Short,
    Flat,
}

impl Position {
    /// Directional multiplier: `+1`, `-1`, or `0`.
    pub fn sign(self) -> f64 {
        match self {
            Position::Long => 1.0,
            Position::Short => -1.0,
            Position::Flat => 0.0,
        }
    }
}

/// Which family a strategy belongs to: used by the grid search
/// to match strategies against the regime label they're suited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyFamily {
    Trending,
    MeanReverting,
    Neutral,
}

/// One of the nine canonical strategies with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrategySpec {
    MaCross { fast: usize, slow: usize },
    EmaCross { fast: usize, slow: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    DonchianBreakout { lookback: usize },
    BollingerRevert { window: usize, std_mult: f64 },
    RsiRevert { window: usize, oversold: f64, overbought: f64 },
    KeltnerRevert { ema_window: usize, atr_window: usize, multiplier: f64 },
    AtrFilteredTrend { fast: usize, slow: usize, atr_window: usize, atr_threshold: f64 },
    CarryHold,
}

impl StrategySpec {
    pub fn family(&self) -> StrategyFamily {
        match self {
            StrategySpec::MaCross { .. }
            | StrategySpec::EmaCross { .. }
            | StrategySpec::Macd { .. }
            | StrategySpec::DonchianBreakout { .. } => StrategyFamily::Trending,
            StrategySpec::BollingerRevert { .. }
            | StrategySpec::RsiRevert { .. }
            | StrategySpec::KeltnerRevert { .. } => StrategyFamily::MeanReverting,
            StrategySpec::AtrFilteredTrend { .. } | StrategySpec::CarryHold => {
                StrategyFamily::Neutral
            }
        }
    }

    /// Stable identifier, e.g. `"ma_cross"`, used in reports and logs.
    pub fn id(&self) -> &'static str {
        match self {
            StrategySpec::MaCross { .. } => "ma_cross",
            StrategySpec::EmaCross { .. } => "ema_cross",
            StrategySpec::Macd { .. } => "macd",
            StrategySpec::DonchianBreakout { .. } => "donchian_breakout",
            StrategySpec::BollingerRevert { .. } => "bollinger_revert",
            StrategySpec::RsiRevert { .. } => "rsi_revert",
            StrategySpec::KeltnerRevert { .. } => "keltner_revert",
            StrategySpec::AtrFilteredTrend { .. } => "atr_filtered_trend",
            StrategySpec::CarryHold => "carry_hold",
        }
    }

    /// Count of free parameters, used by grid search's parameter-sparsity
    /// tiebreak: fewer parameters ranks higher among ties.
    pub fn parameter_count(&self) -> usize {
        match self {
            StrategySpec::MaCross { .. } | StrategySpec::EmaCross { .. } => 2,
            StrategySpec::Macd { .. } => 3,
            StrategySpec::DonchianBreakout { .. } => 1,
            StrategySpec::BollingerRevert { .. } => 2,
            StrategySpec::RsiRevert { .. } => 3,
            StrategySpec::KeltnerRevert { .. } => 3,
            StrategySpec::AtrFilteredTrend { .. } => 4,
            StrategySpec::CarryHold => 0,
        }
    }

    /// Flatten this spec's fields into a name → value mapping, the
    /// `parameter_set` spec's `StrategySpec` record describes. Kept as a
    /// `BTreeMap` so serialization and display order stay stable across
    /// runs.
    pub fn parameter_set(&self) -> std::collections::BTreeMap<String, f64> {
        let mut map = std::collections::BTreeMap::new();
        match *self {
            StrategySpec::MaCross { fast, slow } | StrategySpec::EmaCross { fast, slow } => {
                map.insert("fast".to_string(), fast as f64);
                map.insert("slow".to_string(), slow as f64);
            }
            StrategySpec::Macd { fast, slow, signal } => {
                map.insert("fast".to_string(), fast as f64);
                map.insert("slow".to_string(), slow as f64);
                map.insert("signal".to_string(), signal as f64);
            }
            StrategySpec::DonchianBreakout { lookback } => {
                map.insert("lookback".to_string(), lookback as f64);
            }
            StrategySpec::BollingerRevert { window, std_mult } => {
                map.insert("window".to_string(), window as f64);
                map.insert("std_mult".to_string(), std_mult);
            }
            StrategySpec::RsiRevert { window, oversold, overbought } => {
                map.insert("window".to_string(), window as f64);
                map.insert("oversold".to_string(), oversold);
                map.insert("overbought".to_string(), overbought);
            }
            StrategySpec::KeltnerRevert { ema_window, atr_window, multiplier } => {
                map.insert("ema_window".to_string(), ema_window as f64);
                map.insert("atr_window".to_string(), atr_window as f64);
                map.insert("multiplier".to_string(), multiplier);
            }
            StrategySpec::AtrFilteredTrend { fast, slow, atr_window, atr_threshold } => {
                map.insert("fast".to_string(), fast as f64);
                map.insert("slow".to_string(), slow as f64);
                map.insert("atr_window".to_string(), atr_window as f64);
                map.insert("atr_threshold".to_string(), atr_threshold);
            }
            StrategySpec::CarryHold => {}
        }
        map
    }
}

fn cross_signal(fast: &[Option<f64>], slow: &[Option<f64>]) -> Vec<Position> {
    fast.iter()
        .zip(slow.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) if f > s => Position::Long,
            (Some(f), Some(s)) if f < s => Position::Short,
            _ => Position::Flat,
        })
        .collect()
}

fn donchian_breakout_signal(bars: &[Bar], lookback: usize) -> Vec<Position> {
    let channel = donchian_channel(bars, lookback);
    let mut out = vec![Position::Flat; bars.len()];
    let mut held = Position::Flat;
    for (i, bar) in bars.iter().enumerate() {
        if let Some(ch) = channel[i] {
            if bar.close > ch.upper {
                held = Position::Long;
            } else if bar.close < ch.lower {
                held = Position::Short;
            }
        }
        out[i] = held;
    }
    out
}

fn bollinger_revert_signal(bars: &[Bar], window: usize, std_mult: f64) -> Vec<Position> {
    let bands = bollinger_bands(bars, window, std_mult);
    bars.iter()
        .zip(bands.iter())
        .map(|(bar, b)| match b {
            Some(b) if bar.close < b.lower => Position::Long,
            Some(b) if bar.close > b.upper => Position::Short,
            Some(_) => Position::Flat,
            None => Position::Flat,
        })
        .collect()
}

fn rsi_revert_signal(bars: &[Bar], window: usize, oversold: f64, overbought: f64) -> Vec<Position> {
    rsi(bars, window)
        .iter()
        .map(|r| match r {
            Some(v) if *v < oversold => Position::Long,
            Some(v) if *v > overbought => Position::Short,
            Some(_) => Position::Flat,
            None => Position::Flat,
        })
        .collect()
}

fn keltner_revert_signal(
    bars: &[Bar],
    ema_window: usize,
    atr_window: usize,
    multiplier: f64,
) -> Vec<Position> {
    let bands = keltner_channel(bars, ema_window, atr_window, multiplier);
    bars.iter()
        .zip(bands.iter())
        .map(|(bar, b)| match b {
            Some(b) if bar.close < b.lower => Position::Long,
            Some(b) if bar.close > b.upper => Position::Short,
            Some(_) => Position::Flat,
            None => Position::Flat,
        })
        .collect()
}

fn atr_filtered_trend_signal(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    atr_window: usize,
    atr_threshold: f64,
) -> Vec<Position> {
    let trend = cross_signal(&sma_close(bars, fast), &sma_close(bars, slow));
    let atr = atr_wilder(bars, atr_window);
    trend
        .iter()
        .zip(atr.iter())
        .map(|(p, a)| match a {
            Some(a) if *a >= atr_threshold => *p,
            _ => Position::Flat,
        })
        .collect()
}

/// Compute the per-bar position signal for a strategy. Every
/// branch preserves the indicators' no-lookahead invariant.
pub fn signal_from_bars(spec: &StrategySpec, bars: &[Bar]) -> Vec<Position> {
    match spec {
        StrategySpec::MaCross { fast, slow } => {
            cross_signal(&sma_close(bars, *fast), &sma_close(bars, *slow))
        }
        StrategySpec::EmaCross { fast, slow } => {
            cross_signal(&ema_close(bars, *fast), &ema_close(bars, *slow))
        }
        StrategySpec::Macd { fast, slow, signal } => macd(bars, *fast, *slow, *signal)
            .iter()
            .map(|m| match m {
                Some(m) if m.histogram > 0.0 => Position::Long,
                Some(m) if m.histogram < 0.0 => Position::Short,
                Some(_) => Position::Flat,
                None => Position::Flat,
            })
            .collect(),
        StrategySpec::DonchianBreakout { lookback } => donchian_breakout_signal(bars, *lookback),
        StrategySpec::BollingerRevert { window, std_mult } => {
            bollinger_revert_signal(bars, *window, *std_mult)
        }
        StrategySpec::RsiRevert {
            window,
            oversold,
            overbought,
        } => rsi_revert_signal(bars, *window, *oversold, *overbought),
        StrategySpec::KeltnerRevert {
            ema_window,
            atr_window,
            multiplier,
        } => keltner_revert_signal(bars, *ema_window, *atr_window, *multiplier),
        StrategySpec::AtrFilteredTrend {
            fast,
            slow,
            atr_window,
            atr_threshold,
        } => atr_filtered_trend_signal(bars, *fast, *slow, *atr_window, *atr_threshold),
        StrategySpec::CarryHold => vec![Position::Long; bars.len()],
    }
}

/// Bounded cartesian parameter grid for one strategy family, capped at
/// `max_grid_size`. Grids are small, hand-picked ranges — not
/// every combination a user could imagine, but enough to rank within a
/// family.
pub fn parameter_grid(id: &str, max_grid_size: usize) -> Vec<StrategySpec> {
    let grid: Vec<StrategySpec> = match id {
        "ma_cross" => cartesian_ma(&[5, 10, 20], &[20, 50, 100], StrategySpec::MaCross),
        "ema_cross" => cartesian_ma(&[5, 10, 20], &[20, 50, 100], StrategySpec::EmaCross),
        "macd" => [(8, 17, 9), (12, 26, 9), (5, 35, 5)]
            .into_iter()
            .map(|(fast, slow, signal)| StrategySpec::Macd { fast, slow, signal })
            .collect(),
        "donchian_breakout" => [10usize, 20, 55, 100]
            .into_iter()
            .map(|lookback| StrategySpec::DonchianBreakout { lookback })
            .collect(),
        "bollinger_revert" => {
            let mut out = Vec::new();
            for &window in &[10usize, 20, 30] {
                for &std_mult in &[1.5, 2.0, 2.5] {
                    out.push(StrategySpec::BollingerRevert { window, std_mult });
                }
            }
            out
        }
        "rsi_revert" => {
            let mut out = Vec::new();
            for &window in &[7usize, 14, 21] {
                for &(oversold, overbought) in &[(20.0, 80.0), (30.0, 70.0)] {
                    out.push(StrategySpec::RsiRevert {
                        window,
                        oversold,
                        overbought,
                    });
                }
            }
            out
        }
        "keltner_revert" => {
            let mut out = Vec::new();
            for &ema_window in &[10usize, 20] {
                for &atr_window in &[10usize, 20] {
                    for &multiplier in &[1.5, 2.0] {
                        out.push(StrategySpec::KeltnerRevert {
                            ema_window,
                            atr_window,
                            multiplier,
                        });
                    }
                }
            }
            out
        }
        "atr_filtered_trend" => {
            let mut out = Vec::new();
            for &(fast, slow) in &[(10usize, 50usize), (20, 100)] {
                for &atr_window in &[14usize, 20] {
                    for &atr_threshold in &[0.005, 0.01] {
                        out.push(StrategySpec::AtrFilteredTrend {
                            fast,
                            slow,
                            atr_window,
                            atr_threshold,
                        });
                    }
                }
            }
            out
        }
        "carry_hold" => vec![StrategySpec::CarryHold],
        _ => Vec::new(),
    };

    if grid.len() > max_grid_size {
        grid.into_iter().take(max_grid_size).collect()
    } else {
        grid
    }
}

fn cartesian_ma(
    fasts: &[usize],
    slows: &[usize],
    build: impl Fn(usize, usize) -> StrategySpec,
) -> Vec<StrategySpec> {
    let mut out = Vec::new();
    for &fast in fasts {
        for &slow in slows {
            if fast < slow {
                out.push(build(fast, slow));
            }
        }
    }
    out
}

/// The nine canonical strategy identifiers.
pub const CANONICAL_STRATEGY_IDS: [&str; 9] = [
    "ma_cross",
    "ema_cross",
    "macd",
    "donchian_breakout",
    "bollinger_revert",
    "rsi_revert",
    "keltner_revert",
    "atr_filtered_trend",
    "carry_hold",
];

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
                    .with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0)
                    .unwrap();
                Bar::new(ts, c, c * 1.01, c * 0.99, c, 1000.0, "TEST", "1d")
            })
            .collect()
    }

    #[test]
    fn all_nine_canonical_ids_have_grids() {
        for id in CANONICAL_STRATEGY_IDS {
            let grid = parameter_grid(id, 256);
            assert!(!grid.is_empty(), "grid for {id} is empty");
        }
    }

    #[test]
    fn grids_are_capped_at_max_size() {
        let grid = parameter_grid("bollinger_revert", 2);
        assert!(grid.len() <= 2);
    }

    #[test]
    fn carry_hold_is_always_long() {
        let bars = bars_from_closes(&[100.0, 101.0, 99.0, 102.0]);
        let signal = signal_from_bars(&StrategySpec::CarryHold, &bars);
        assert!(signal.iter().all(|p| *p == Position::Long));
    }

    #[test]
    fn ma_cross_flat_during_warmup() {
        let bars = bars_from_closes(&(1..=5).map(|x| x as f64).collect::<Vec<_>>());
        let spec = StrategySpec::MaCross { fast: 3, slow: 10 };
        let signal = signal_from_bars(&spec, &bars);
        assert!(signal.iter().all(|p| *p == Position::Flat));
    }

    #[test]
    fn ma_cross_goes_long_on_uptrend() {
        let closes: Vec<f64> = (1..=30).map(|x| 100.0 + x as f64).collect();
        let bars = bars_from_closes(&closes);
        let spec = StrategySpec::MaCross { fast: 3, slow: 10 };
        let signal = signal_from_bars(&spec, &bars);
        assert_eq!(*signal.last().unwrap(), Position::Long);
    }

    #[test]
    fn donchian_breakout_holds_position_between_channel_touches() {
        let mut closes: Vec<f64> = vec![100.0; 10];
        closes.push(200.0); // breakout up
        closes.extend(vec![200.0; 5]); // holds
        let bars = bars_from_closes(&closes);
        let spec = StrategySpec::DonchianBreakout { lookback: 5 };
        let signal = signal_from_bars(&spec, &bars);
        assert_eq!(*signal.last().unwrap(), Position::Long);
    }

    #[test]
    fn bollinger_revert_longs_below_lower_band() {
        let mut closes = vec![100.0; 20];
        closes.push(70.0); // sharp drop below lower band
        let bars = bars_from_closes(&closes);
        let spec = StrategySpec::BollingerRevert {
            window: 10,
            std_mult: 2.0,
        };
        let signal = signal_from_bars(&spec, &bars);
        assert_eq!(*signal.last().unwrap(), Position::Long);
    }

    #[test]
    fn rsi_revert_longs_when_oversold() {
        let mut closes: Vec<f64> = vec![100.0];
        for _ in 0..20 {
            closes.push(closes.last().unwrap() - 1.0);
        }
        let bars = bars_from_closes(&closes);
        let spec = StrategySpec::RsiRevert {
            window: 14,
            oversold: 30.0,
            overbought: 70.0,
        };
        let signal = signal_from_bars(&spec, &bars);
        assert_eq!(*signal.last().unwrap(), Position::Long);
    }

    #[test]
    fn atr_filtered_trend_flat_below_threshold() {
        let bars = bars_from_closes(&vec![100.0; 60]);
        let spec = StrategySpec::AtrFilteredTrend {
            fast: 5,
            slow: 20,
            atr_window: 14,
            atr_threshold: 1.0,
        };
        let signal = signal_from_bars(&spec, &bars);
        assert!(signal.iter().all(|p| *p == Position::Flat));
    }

    #[test]
    fn family_assignment_matches_spec_grouping() {
        assert_eq!(
            StrategySpec::MaCross { fast: 5, slow: 20 }.family(),
            StrategyFamily::Trending
        );
        assert_eq!(
            StrategySpec::RsiRevert {
                window: 14,
                oversold: 30.0,
                overbought: 70.0
            }
            .family(),
            StrategyFamily::MeanReverting
        );
        assert_eq!(StrategySpec::CarryHold.family(), StrategyFamily::Neutral);
    }

    #[test]
    fn parameter_set_matches_parameter_count() {
        let spec = StrategySpec::MaCross { fast: 10, slow: 50 };
        let set = spec.parameter_set();
        assert_eq!(set.len(), spec.parameter_count());
        assert_eq!(set.get("fast"), Some(&10.0));
        assert_eq!(set.get("slow"), Some(&50.0));

        assert!(StrategySpec::CarryHold.parameter_set().is_empty());
    }

    #[test]
    fn parameter_sparsity_orders_carry_hold_lowest() {
        assert_eq!(StrategySpec::CarryHold.parameter_count(), 0);
        assert!(
            StrategySpec::CarryHold.parameter_count()
                < StrategySpec::AtrFilteredTrend {
                    fast: 5,
                    slow: 20,
                    atr_window: 14,
                    atr_threshold: 0.01
                }
                .parameter_count()
        );
    }
}
