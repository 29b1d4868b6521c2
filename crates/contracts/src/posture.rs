//! Calibration baselines and posture results - Evaluator input/output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Starting (and maximum) score of a run
pub const MAX_SCORE: u8 = 10;

/// One independently evaluated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Left/right eye distance ratio
    EyeRatio,
    /// Footrest pressure
    Foot,
    /// Seat cushion pressure
    Cushion,
}

impl Channel {
    /// All channels in evaluation precedence order
    pub const ALL: [Channel; 3] = [Channel::EyeRatio, Channel::Foot, Channel::Cushion];

    /// Stable name used in logs and detail maps
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::EyeRatio => "eye_ratio",
            Channel::Foot => "foot",
            Channel::Cushion => "cushion",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Personal reference values captured during calibration
///
/// A channel is `None` when no usable sample was collected for it; the
/// evaluator skips such channels instead of treating them as bad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    /// Capture completion time
    pub timestamp: DateTime<Utc>,

    /// Mean footrest pressure
    pub baseline_foot: Option<f64>,

    /// Mean cushion pressure
    pub baseline_cushion: Option<f64>,

    /// Mean left/right eye distance ratio
    pub baseline_eye_ratio: Option<f64>,

    /// Whether the capture ran to completion
    pub completed: bool,

    /// Number of usable samples per channel
    #[serde(default)]
    pub samples_used: BTreeMap<Channel, usize>,
}

impl CalibrationBaseline {
    /// Create a completed baseline with all channels valid
    pub fn new(foot: f64, cushion: f64, eye_ratio: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            baseline_foot: Some(foot),
            baseline_cushion: Some(cushion),
            baseline_eye_ratio: Some(eye_ratio),
            completed: true,
            samples_used: BTreeMap::new(),
        }
    }

    /// Baseline value of a channel, if usable
    ///
    /// The eye ratio is only usable when finite and positive, since it is
    /// the denominator of the relative deviation.
    pub fn channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::EyeRatio => self
                .baseline_eye_ratio
                .filter(|ratio| ratio.is_finite() && *ratio > 0.0),
            Channel::Foot => self.baseline_foot.filter(|v| v.is_finite()),
            Channel::Cushion => self.baseline_cushion.filter(|v| v.is_finite()),
        }
    }

    /// Channels that cannot be evaluated against this baseline
    pub fn invalid_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.channel(*channel).is_none())
            .collect()
    }
}

/// Posture verdict of one evaluation cycle
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PostureStatus {
    /// All channels within tolerance
    Good,
    /// Eye distance ratio out of tolerance (leaning)
    BadEyes,
    /// Footrest pressure out of tolerance
    BadFoot,
    /// Cushion pressure out of tolerance
    BadCushion,
    /// Not enough signal to judge
    #[default]
    Unknown,
}

impl PostureStatus {
    /// Whether this status is a penalized posture
    pub fn is_bad(&self) -> bool {
        matches!(
            self,
            PostureStatus::BadEyes | PostureStatus::BadFoot | PostureStatus::BadCushion
        )
    }

    /// Bad status reported for an offending channel
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::EyeRatio => PostureStatus::BadEyes,
            Channel::Foot => PostureStatus::BadFoot,
            Channel::Cushion => PostureStatus::BadCushion,
        }
    }

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            PostureStatus::Good => "good",
            PostureStatus::BadEyes => "bad_eyes",
            PostureStatus::BadFoot => "bad_foot",
            PostureStatus::BadCushion => "bad_cushion",
            PostureStatus::Unknown => "unknown",
        }
    }

    /// User-facing message for presentation
    pub fn message(&self) -> &'static str {
        match self {
            PostureStatus::Good => "Good posture, keep it up!",
            PostureStatus::BadEyes => "Posture is off! Don't lean forward.",
            PostureStatus::BadFoot => "Uneven pressure on the footrest!",
            PostureStatus::BadCushion => "Uneven pressure on the cushion!",
            PostureStatus::Unknown => "Posture cannot be determined right now.",
        }
    }
}

impl fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureResult {
    /// Evaluation time
    pub timestamp: DateTime<Utc>,

    /// Unified status
    pub status: PostureStatus,

    /// Score after this cycle, in `[0, MAX_SCORE]`
    pub score: u8,

    /// Seconds since the run started
    pub elapsed_seconds: f64,

    /// Raw channel values and computed deviations
    pub details: BTreeMap<String, f64>,

    /// True only on the cycle that applied a penalty
    #[serde(default)]
    pub alert: bool,

    /// Whether a penalty cooldown was active when this cycle ran
    #[serde(default)]
    pub cooldown_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_eye_baseline_is_unusable() {
        let mut baseline = CalibrationBaseline::new(500.0, 500.0, 0.0);
        assert_eq!(baseline.channel(Channel::EyeRatio), None);
        baseline.baseline_eye_ratio = Some(f64::NAN);
        assert_eq!(baseline.invalid_channels(), vec![Channel::EyeRatio]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PostureStatus::BadCushion).unwrap();
        assert_eq!(json, "\"bad_cushion\"");
        assert!(PostureStatus::BadFoot.is_bad());
        assert!(!PostureStatus::Unknown.is_bad());
    }
}
