//! 模拟数据源
//!
//! Stand-ins used when no device is available. Eye distances and pressure
//! values are drawn from normal distributions; pressure is clamped into the
//! transducer range.

use contracts::{
    ContractError, FrameSample, FrameSource, OpticalConfig, PressureConfig, PressureSample,
    PressureSource, SampleOrigin,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{IngestionError, Result};

fn normal(source_name: &str, mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    if !mean.is_finite() || !(std_dev.is_finite() && std_dev >= 0.0) {
        return Err(IngestionError::invalid_distribution(
            source_name,
            format!("N({mean}, {std_dev}) needs a finite mean and a finite std >= 0"),
        ));
    }
    Normal::new(mean, std_dev)
        .map_err(|e| IngestionError::invalid_distribution(source_name, e.to_string()))
}

/// Simulated optical source
///
/// Left and right eye distances are independent draws from N(mean, std).
#[derive(Debug, Clone)]
pub struct SimulatedFrameSource {
    name: String,
    eye: Normal<f64>,
    rng: StdRng,
    sequence: u64,
}

impl SimulatedFrameSource {
    pub const DEFAULT_NAME: &'static str = "optical_sim";

    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        Self::build(mean, std_dev, StdRng::from_os_rng())
    }

    /// Reproducible stream for a given seed
    pub fn with_seed(mean: f64, std_dev: f64, seed: u64) -> Result<Self> {
        Self::build(mean, std_dev, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &OpticalConfig) -> Result<Self> {
        Self::new(config.simulated_eye_mean, config.simulated_eye_std)
    }

    fn build(mean: f64, std_dev: f64, rng: StdRng) -> Result<Self> {
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            eye: normal(Self::DEFAULT_NAME, mean, std_dev)?,
            rng,
            sequence: 0,
        })
    }

    /// Rename (metrics/log label)
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Draw one frame
    pub fn sample(&mut self) -> FrameSample {
        self.sequence += 1;
        let left = self.eye.sample(&mut self.rng);
        let right = self.eye.sample(&mut self.rng);
        FrameSample::new(self.sequence, Some(left), Some(right))
    }
}

impl FrameSource for SimulatedFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Simulated
    }

    fn poll_frame(&mut self) -> std::result::Result<Option<FrameSample>, ContractError> {
        Ok(Some(self.sample()))
    }
}

/// Simulated pressure pad
#[derive(Debug, Clone)]
pub struct SimulatedPressureSource {
    name: String,
    foot: Normal<f64>,
    cushion: Normal<f64>,
    rng: StdRng,
}

impl SimulatedPressureSource {
    pub const DEFAULT_NAME: &'static str = "pressure_sim";

    pub fn new(foot: (f64, f64), cushion: (f64, f64)) -> Result<Self> {
        Self::build(foot, cushion, StdRng::from_os_rng())
    }

    pub fn with_seed(foot: (f64, f64), cushion: (f64, f64), seed: u64) -> Result<Self> {
        Self::build(foot, cushion, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &PressureConfig) -> Result<Self> {
        Self::new(
            (config.simulated_foot_mean, config.simulated_foot_std),
            (config.simulated_cushion_mean, config.simulated_cushion_std),
        )
    }

    fn build(foot: (f64, f64), cushion: (f64, f64), rng: StdRng) -> Result<Self> {
        Ok(Self {
            name: Self::DEFAULT_NAME.to_string(),
            foot: normal(Self::DEFAULT_NAME, foot.0, foot.1)?,
            cushion: normal(Self::DEFAULT_NAME, cushion.0, cushion.1)?,
            rng,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Draw one sample, truncated to whole units and clamped
    pub fn sample(&mut self) -> PressureSample {
        let foot = self.foot.sample(&mut self.rng) as i64;
        let cushion = self.cushion.sample(&mut self.rng) as i64;
        PressureSample::new(foot, cushion, SampleOrigin::Simulated)
    }
}

impl PressureSource for SimulatedPressureSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Simulated
    }

    fn poll_pressure(&mut self) -> std::result::Result<Option<PressureSample>, ContractError> {
        Ok(Some(self.sample()))
    }
}
