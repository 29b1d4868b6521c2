//! Sensor samples - Ingestion output
//!
//! Raw readings published by the optical and pressure producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lowest value a pressure transducer can report
pub const PRESSURE_MIN: u16 = 1;

/// Highest value a pressure transducer can report
pub const PRESSURE_MAX: u16 = 1024;

/// Optical pose sample
///
/// Produced once per optical cycle. Only the latest value is kept downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// Capture time
    pub timestamp: DateTime<Utc>,

    /// Frame sequence number (monotonically increasing per producer)
    pub frame_sequence_id: u64,

    /// Inner-to-outer distance of the left eye (normalized image units)
    pub eye_distance_left: Option<f64>,

    /// Inner-to-outer distance of the right eye (normalized image units)
    pub eye_distance_right: Option<f64>,

    /// Named pose keypoints
    #[serde(default)]
    pub keypoints: HashMap<String, Keypoint>,
}

impl FrameSample {
    /// Create a frame carrying only eye distances
    pub fn new(frame_sequence_id: u64, left: Option<f64>, right: Option<f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            frame_sequence_id,
            eye_distance_left: left,
            eye_distance_right: right,
            keypoints: HashMap::new(),
        }
    }

    /// Left/right eye distance ratio
    ///
    /// `None` when either side is missing or the right distance is not positive.
    pub fn eye_ratio(&self) -> Option<f64> {
        eye_ratio(self.eye_distance_left, self.eye_distance_right)
    }
}

/// Ratio of two optional eye distances, rejecting unusable denominators
pub fn eye_ratio(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (Some(l), Some(r)) if r > 0.0 && l.is_finite() && r.is_finite() => Some(l / r),
        _ => None,
    }
}

/// A single pose keypoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// X coordinate (0-1)
    pub x: f64,
    /// Y coordinate (0-1)
    pub y: f64,
    /// Depth
    pub z: f64,
    /// Visibility (0-1)
    pub visibility: f64,
}

/// Pressure pad sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    /// Capture time
    pub timestamp: DateTime<Utc>,

    /// Footrest pressure, in `[PRESSURE_MIN, PRESSURE_MAX]`
    pub foot_value: u16,

    /// Seat cushion pressure, in `[PRESSURE_MIN, PRESSURE_MAX]`
    pub cushion_value: u16,

    /// Where the reading came from
    pub source: SampleOrigin,
}

impl PressureSample {
    /// Create a sample, clamping both channels into the transducer range
    pub fn new(foot_value: i64, cushion_value: i64, source: SampleOrigin) -> Self {
        Self {
            timestamp: Utc::now(),
            foot_value: clamp_pressure(foot_value),
            cushion_value: clamp_pressure(cushion_value),
            source,
        }
    }
}

/// Clamp a raw reading into `[PRESSURE_MIN, PRESSURE_MAX]`
pub fn clamp_pressure(raw: i64) -> u16 {
    raw.clamp(PRESSURE_MIN as i64, PRESSURE_MAX as i64) as u16
}

/// Origin of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    /// Real device
    Hardware,
    /// Statistically generated stand-in
    Simulated,
}
