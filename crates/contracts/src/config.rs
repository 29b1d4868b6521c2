//! AppConfig - Config Loader output
//!
//! Describes the complete runtime configuration: sensing sources, evaluation
//! thresholds, calibration capture and presentation sinks. Every field has a
//! default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Display name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Sensing sources
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Evaluation thresholds and timing
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Calibration capture
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Presentation sinks
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            app_name: default_app_name(),
            sensors: SensorsConfig::default(),
            processing: ProcessingConfig::default(),
            calibration: CalibrationConfig::default(),
            sinks: default_sinks(),
        }
    }
}

fn default_app_name() -> String {
    "Posture Sentinel".to_string()
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig {
        name: "log".to_string(),
        sink_type: SinkType::Log,
        queue_capacity: default_queue_capacity(),
        params: HashMap::new(),
    }]
}

/// Sensing source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default)]
    pub optical: OpticalConfig,

    #[serde(default)]
    pub pressure: PressureConfig,
}

/// How a producer obtains its samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Statistically generated samples from the start
    #[default]
    Simulated,
    /// Real device, falling back to simulation on repeated unavailability
    Hardware,
}

/// Optical pose source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpticalConfig {
    #[serde(default)]
    pub mode: SourceMode,

    /// Camera device index (hardware mode)
    #[serde(default)]
    pub device_id: u32,

    /// Polling rate (Hz)
    #[serde(default = "default_optical_rate")]
    pub rate_hz: f64,

    /// Consecutive unavailable polls before switching to simulation
    #[serde(default = "default_optical_fallback")]
    pub fallback_after: u32,

    /// Simulated eye distance mean
    #[serde(default = "default_eye_mean")]
    pub simulated_eye_mean: f64,

    /// Simulated eye distance standard deviation
    #[serde(default = "default_eye_std")]
    pub simulated_eye_std: f64,
}

impl Default for OpticalConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Simulated,
            device_id: 0,
            rate_hz: default_optical_rate(),
            fallback_after: default_optical_fallback(),
            simulated_eye_mean: default_eye_mean(),
            simulated_eye_std: default_eye_std(),
        }
    }
}

fn default_optical_rate() -> f64 {
    30.0
}

fn default_optical_fallback() -> u32 {
    30
}

fn default_eye_mean() -> f64 {
    0.05
}

fn default_eye_std() -> f64 {
    0.01
}

/// Pressure pad source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureConfig {
    #[serde(default)]
    pub mode: SourceMode,

    /// Serial port of the pad controller (hardware mode)
    #[serde(default)]
    pub serial_port: Option<String>,

    /// Polling rate (Hz)
    #[serde(default = "default_pressure_rate")]
    pub rate_hz: f64,

    /// Consecutive unavailable polls before switching to simulation
    #[serde(default = "default_pressure_fallback")]
    pub fallback_after: u32,

    #[serde(default = "default_pressure_mean")]
    pub simulated_foot_mean: f64,

    #[serde(default = "default_pressure_std")]
    pub simulated_foot_std: f64,

    #[serde(default = "default_pressure_mean")]
    pub simulated_cushion_mean: f64,

    #[serde(default = "default_pressure_std")]
    pub simulated_cushion_std: f64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Simulated,
            serial_port: None,
            rate_hz: default_pressure_rate(),
            fallback_after: default_pressure_fallback(),
            simulated_foot_mean: default_pressure_mean(),
            simulated_foot_std: default_pressure_std(),
            simulated_cushion_mean: default_pressure_mean(),
            simulated_cushion_std: default_pressure_std(),
        }
    }
}

fn default_pressure_rate() -> f64 {
    10.0
}

fn default_pressure_fallback() -> u32 {
    10
}

fn default_pressure_mean() -> f64 {
    500.0
}

fn default_pressure_std() -> f64 {
    30.0
}

/// Evaluation thresholds and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum relative deviation of the eye ratio
    #[serde(default = "default_eye_threshold")]
    pub eye_distance_threshold: f64,

    /// Maximum absolute deviation of either pressure channel
    #[serde(default = "default_pressure_threshold")]
    pub pressure_threshold: f64,

    /// Lower bound of the randomized re-check interval (seconds)
    #[serde(default = "default_interval_min")]
    pub check_interval_min_s: f64,

    /// Upper bound of the randomized re-check interval (seconds)
    #[serde(default = "default_interval_max")]
    pub check_interval_max_s: f64,

    /// Penalty cooldown window (seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown_s: f64,

    /// Seed for the re-check interval generator (None = OS entropy)
    #[serde(default)]
    pub interval_seed: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            eye_distance_threshold: default_eye_threshold(),
            pressure_threshold: default_pressure_threshold(),
            check_interval_min_s: default_interval_min(),
            check_interval_max_s: default_interval_max(),
            cooldown_s: default_cooldown(),
            interval_seed: None,
        }
    }
}

impl ProcessingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_s.max(0.0))
    }

    pub fn check_interval_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.check_interval_min_s.max(0.0)),
            Duration::from_secs_f64(self.check_interval_max_s.max(0.0)),
        )
    }
}

fn default_eye_threshold() -> f64 {
    0.1
}

fn default_pressure_threshold() -> f64 {
    200.0
}

fn default_interval_min() -> f64 {
    2.0
}

fn default_interval_max() -> f64 {
    10.0
}

fn default_cooldown() -> f64 {
    5.0
}

/// Calibration capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Number of samples averaged into the baseline
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// Spacing between samples (milliseconds)
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Delay before the first sample so producers can deliver (milliseconds)
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,

    /// Calibrate as soon as the pipeline starts
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            sample_interval_ms: default_sample_interval_ms(),
            warmup_ms: default_warmup_ms(),
            auto_start: default_auto_start(),
        }
    }
}

impl CalibrationConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

fn default_sample_count() -> usize {
    10
}

fn default_sample_interval_ms() -> u64 {
    100
}

fn default_warmup_ms() -> u64 {
    500
}

fn default_auto_start() -> bool {
    true
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Worker queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Structured alert log
    Log,
    /// Atomic status snapshot file (`path` param)
    Snapshot,
}
