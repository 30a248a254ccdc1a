//! Error types for the research core.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for the signal-to-equity pipeline.
///
/// Contract violations carry the offending field and value so callers can
/// surface precise messages; numerical edge cases are *not* errors and are
/// handled with sentinel values inside the metric formulas.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("{component}: input is empty")]
    EmptyInput { component: &'static str },

    #[error("non-monotonic timestamp index at position {position}: {timestamp}")]
    NonMonotonicIndex {
        position: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("invalid bar at position {position}: {detail}")]
    InvalidBar { position: usize, detail: String },

    #[error("invalid configuration: {field} = {value}: {detail}")]
    InvalidConfig {
        field: &'static str,
        value: f64,
        detail: &'static str,
    },

    #[error("{component}: insufficient data: need {needed}, got {got}")]
    InsufficientData {
        component: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("signal frame has {signals} rows but price series has {prices} bars")]
    LengthMismatch { prices: usize, signals: usize },

    #[error("model must be trained before predicting")]
    ModelNotFitted,

    #[error("training failed: {0}")]
    TrainingError(String),

    #[error("strategy error: {0}")]
    StrategyError(String),

    #[error("{component}: cancelled by caller")]
    Cancelled { component: &'static str },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, BacktestError>;
