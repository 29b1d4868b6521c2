//! # Evaluator
//!
//! Posture evaluation: calibration capture, the scoring state machine and
//! the bus-attached service that drives it.
//!
//! ## Data flow
//! ```text
//! Frame/Pressure ──► LatestReadings ──► CalibrationCapture ──► Calibration event
//!        │                                                          │
//!        └───────────────────► PostureEvaluator ◄──────────────────┘
//!                                     │
//!                                     ▼
//!                       PostureResult / SessionFinished
//! ```

pub mod calibration;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod service;

pub use calibration::{
    run_calibration, BaselineAccumulator, CalibrationCapture, LatestReadings, ReadingProvider,
};
pub use engine::{EvaluationOutcome, EvaluatorConfig, EvaluatorPhase, PostureEvaluator};
pub use error::EvaluatorError;
pub use schedule::{FixedInterval, IntervalSchedule, RandomInterval};
pub use service::{EvaluatorService, EVALUATOR_CATEGORIES};
