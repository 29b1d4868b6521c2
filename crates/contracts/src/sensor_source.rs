//! Sensing source traits
//!
//! A source is polled at a fixed cadence by its producer task. Each poll
//! yields a sample, `Ok(None)` when nothing is available right now, or a
//! transient error. Neither of the latter two escapes the producer.

use crate::{ContractError, FrameSample, PressureSample, SampleOrigin};

/// Optical pose source
pub trait FrameSource: Send {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Where this source's samples come from
    fn origin(&self) -> SampleOrigin;

    /// Read one frame
    fn poll_frame(&mut self) -> Result<Option<FrameSample>, ContractError>;
}

/// Pressure pad source
pub trait PressureSource: Send {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Where this source's samples come from
    fn origin(&self) -> SampleOrigin;

    /// Read one pressure sample
    fn poll_pressure(&mut self) -> Result<Option<PressureSample>, ContractError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn origin(&self) -> SampleOrigin {
        (**self).origin()
    }

    fn poll_frame(&mut self) -> Result<Option<FrameSample>, ContractError> {
        (**self).poll_frame()
    }
}

impl<T: PressureSource + ?Sized> PressureSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn origin(&self) -> SampleOrigin {
        (**self).origin()
    }

    fn poll_pressure(&mut self) -> Result<Option<PressureSample>, ContractError> {
        (**self).poll_pressure()
    }
}
