//! Error types for the analysis pipeline and the evaluator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a pipeline run before any result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChanError {
    #[error("insufficient data: {available} canonical candles available, {required} required")]
    InsufficientData { required: usize, available: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why a raw bar was excluded from the canonical series.
///
/// These are recorded, not raised: the run continues without the bar.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IntegrityViolation {
    #[error("high {high} is below low {low}")]
    HighBelowLow { high: f64, low: f64 },

    #[error("non-finite value in bar")]
    NonFinite,

    #[error("non-positive price")]
    NonPositivePrice,

    #[error("negative volume {0}")]
    NegativeVolume(f64),

    #[error("timestamp {timestamp} does not advance past {previous}")]
    NonIncreasingTimestamp { timestamp: f64, previous: f64 },
}

/// Errors from the retrospective evaluator. Kept apart from [`ChanError`]
/// so a failed evaluation never reads as a failed analysis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("validation date {validation_date} precedes the first bar at {first}")]
    CutoffBeforeData { validation_date: f64, first: f64 },

    #[error("validation date {validation_date} is after the last bar at {last}")]
    CutoffAfterData { validation_date: f64, last: f64 },

    #[error("horizon of {requested} bars exceeds the {available} bars after the cutoff")]
    HorizonBeyondData { requested: usize, available: usize },

    #[error("analysis of the truncated series failed: {0}")]
    Truncated(#[source] ChanError),

    #[error("analysis of the reference series failed: {0}")]
    Reference(#[source] ChanError),
}
