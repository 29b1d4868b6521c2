//! Evaluator error types

use std::time::Duration;

use dispatcher::BusError;
use thiserror::Error;

/// Evaluator-specific errors
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// Re-check interval bounds are unusable
    #[error("invalid check interval: min={min:?}, max={max:?} (need 0 < min <= max)")]
    InvalidInterval { min: Duration, max: Duration },

    /// Publishing to the bus failed
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}
