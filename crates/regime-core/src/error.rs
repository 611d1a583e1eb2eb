//! Error types for the regime detection pipeline.

use thiserror::Error;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum RegimeError {
    #[error("data error: {0}")]
    Data(String),

    #[error("strategy error: {0}")]
    Strategy(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("insufficient sample: need {needed}, have {actual}")]
    FeatureInsufficient { needed: usize, actual: usize },

    #[error("numerically degenerate input: {0}")]
    NumericalDegenerate(String),

    #[error("data health failed for tier {tier}")]
    DataHealthFailed { tier: String },

    #[error("data health fallback for tier {tier} under strict_mode")]
    DataHealthFallback { tier: String },

    #[error("strategy grid exhausted: no configuration produced a non-trivial signal")]
    GridExhausted,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RegimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        let err = RegimeError::FeatureInsufficient {
            needed: 300,
            actual: 120,
        };
        assert_eq!(
            err.to_string(),
            "insufficient sample: need 300, have 120"
        );
    }
}
