//! `BarSource`: the pluggable contract the orchestrator's `load` node
//! consumes to obtain a tier's bar series.
//!
//! This crate ships no networked implementation — callers (the CLI, tests,
//! BDD fixtures) supply their own `BarSource`, typically backed by a local
//! file or an in-memory fixture. The trait's job is to report bars plus a
//! health marker (`fresh | stale | fallback | failed`), not
//! to perform the fetch itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bar::Bar;

/// Errors a `BarSource` implementation may surface.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("invalid date range: {start} to {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("io error: {message}")]
    IoError { message: String },
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::IoError {
            message: e.to_string(),
        }
    }
}

/// Request parameters for a single tier's bar series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Ticker symbol (e.g., "SPY", "AAPL").
    pub symbol: String,
    /// Start date (inclusive).
    pub start: NaiveDate,
    /// End date (inclusive).
    pub end: NaiveDate,
    /// Bar size label (e.g., "1d", "4h", "15m").
    pub bar_size: String,
}

impl FetchRequest {
    pub fn daily(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            bar_size: "1d".to_string(),
        }
    }

    pub fn with_bar_size(mut self, bar_size: impl Into<String>) -> Self {
        self.bar_size = bar_size.into();
        self
    }
}

/// Per-tier data health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataHealth {
    /// Data is current as of the requested end of range.
    Fresh,
    /// Data is older than expected but still usable.
    Stale,
    /// The primary source failed; this data came from a fallback path.
    Fallback,
    /// No usable data could be produced at all.
    Failed,
}

/// The bars and health marker a `BarSource` returns for one request.
#[derive(Debug, Clone)]
pub struct BarHealth {
    pub bars: Vec<Bar>,
    pub health: DataHealth,
    /// Human-readable note explaining a non-`Fresh` health (e.g. which
    /// fallback path was used, or why the source failed).
    pub note: Option<String>,
}

impl BarHealth {
    pub fn fresh(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            health: DataHealth::Fresh,
            note: None,
        }
    }

    pub fn failed(note: impl Into<String>) -> Self {
        Self {
            bars: Vec::new(),
            health: DataHealth::Failed,
            note: Some(note.into()),
        }
    }
}

/// Contract for obtaining a tier's bar series.
///
/// Implementations own whatever retry/cache/fallback policy they want; this
/// crate only consumes the result.
pub trait BarSource {
    fn fetch(&self, request: &FetchRequest) -> Result<BarHealth, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_request_daily_defaults() {
        let req = FetchRequest::daily(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        );
        assert_eq!(req.symbol, "SPY");
        assert_eq!(req.bar_size, "1d");
    }

    #[test]
    fn bar_health_failed_has_empty_bars() {
        let h = BarHealth::failed("primary source unreachable");
        assert!(h.bars.is_empty());
        assert_eq!(h.health, DataHealth::Failed);
    }
}
