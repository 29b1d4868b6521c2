//! # Contracts
//!
//! Shared vocabulary of the posture pipeline: events, commands, samples,
//! baselines, results, configuration and the sink/source traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Payload timestamps are wall-clock UTC (`chrono`), for presentation only
//! - Scheduling decisions use the monotonic clock inside each component

mod command;
mod config;
mod error;
mod event;
mod posture;
mod sensor;
mod sensor_source;
mod sink;

pub use command::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use posture::*;
pub use sensor::*;
pub use sensor_source::{FrameSource, PressureSource};
pub use sink::*;
