//! Posture evaluation state machine.
//!
//! Pure and clock-injected: every entry point takes the current monotonic
//! instant, so timing behaviour is reproducible in tests.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use contracts::{
    CalibrationBaseline, Channel, FrameSample, PostureResult, PostureStatus, PressureSample,
    ProcessingConfig, MAX_SCORE,
};
use tracing::{debug, info, instrument};

use crate::schedule::IntervalSchedule;

/// Evaluator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorPhase {
    /// No baseline yet
    Uncalibrated,
    /// Baseline stored, first evaluation scheduled
    Armed,
    /// At least one evaluation ran
    Evaluating,
    /// Score reached zero
    Finished,
}

/// Thresholds and cooldown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorConfig {
    /// Maximum relative deviation of the eye ratio
    pub eye_threshold: f64,
    /// Maximum absolute deviation of either pressure channel
    pub pressure_threshold: f64,
    /// Window after a penalty during which no further penalty applies
    pub cooldown: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::from(&ProcessingConfig::default())
    }
}

impl From<&ProcessingConfig> for EvaluatorConfig {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            eye_threshold: config.eye_distance_threshold,
            pressure_threshold: config.pressure_threshold,
            cooldown: config.cooldown(),
        }
    }
}

/// Output of one evaluation cycle
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub result: PostureResult,
    /// True only on the cycle that moved the evaluator to `Finished`
    pub finished_now: bool,
}

/// Posture evaluator
pub struct PostureEvaluator {
    config: EvaluatorConfig,
    schedule: Box<dyn IntervalSchedule>,
    phase: EvaluatorPhase,
    baseline: Option<CalibrationBaseline>,
    latest_frame: Option<FrameSample>,
    latest_pressure: Option<PressureSample>,
    score: u8,
    run_start: Option<Instant>,
    next_eval: Option<Instant>,
    cooldown_until: Option<Instant>,
    evaluations: u64,
}

impl std::fmt::Debug for PostureEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostureEvaluator")
            .field("phase", &self.phase)
            .field("score", &self.score)
            .field("next_eval", &self.next_eval)
            .field("cooldown_until", &self.cooldown_until)
            .field("evaluations", &self.evaluations)
            .finish_non_exhaustive()
    }
}

impl PostureEvaluator {
    pub fn new(config: EvaluatorConfig, schedule: impl IntervalSchedule + 'static) -> Self {
        Self {
            config,
            schedule: Box::new(schedule),
            phase: EvaluatorPhase::Uncalibrated,
            baseline: None,
            latest_frame: None,
            latest_pressure: None,
            score: MAX_SCORE,
            run_start: None,
            next_eval: None,
            cooldown_until: None,
            evaluations: 0,
        }
    }

    pub fn phase(&self) -> EvaluatorPhase {
        self.phase
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.baseline.as_ref()
    }

    /// When the next evaluation becomes due
    pub fn next_eval_at(&self) -> Option<Instant> {
        self.next_eval
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Completed evaluation cycles since the last calibration
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Store a baseline and start a new run
    ///
    /// Returns false (and changes nothing) for an incomplete capture.
    #[instrument(name = "evaluator_calibrate", skip(self, baseline), fields(completed = baseline.completed))]
    pub fn on_calibration(&mut self, baseline: CalibrationBaseline, now: Instant) -> bool {
        if !baseline.completed {
            debug!("Ignoring incomplete calibration");
            return false;
        }

        let skipped = baseline.invalid_channels();
        self.baseline = Some(baseline);
        self.score = MAX_SCORE;
        self.run_start = Some(now);
        self.cooldown_until = None;
        self.evaluations = 0;
        self.next_eval = Some(now + self.schedule.next_interval());
        self.phase = EvaluatorPhase::Armed;

        info!(skipped_channels = ?skipped, "Evaluator armed");
        true
    }

    /// Record a frame and evaluate if due
    pub fn on_frame(&mut self, frame: FrameSample, now: Instant) -> Option<EvaluationOutcome> {
        self.latest_frame = Some(frame);
        self.try_evaluate(now)
    }

    /// Record a pressure sample and evaluate if due
    pub fn on_pressure(&mut self, sample: PressureSample, now: Instant) -> Option<EvaluationOutcome> {
        self.latest_pressure = Some(sample);
        self.try_evaluate(now)
    }

    /// Drop the baseline and all run state
    pub fn reset(&mut self) {
        self.phase = EvaluatorPhase::Uncalibrated;
        self.baseline = None;
        self.latest_frame = None;
        self.latest_pressure = None;
        self.score = MAX_SCORE;
        self.run_start = None;
        self.next_eval = None;
        self.cooldown_until = None;
        self.evaluations = 0;
        info!("Evaluator reset");
    }

    /// Baseline, both latest samples and a due time that has been reached
    pub fn is_ready(&self, now: Instant) -> bool {
        self.baseline.is_some()
            && self.latest_frame.is_some()
            && self.latest_pressure.is_some()
            && self.next_eval.is_some_and(|due| now >= due)
    }

    fn try_evaluate(&mut self, now: Instant) -> Option<EvaluationOutcome> {
        if !self.is_ready(now) {
            return None;
        }
        let (baseline, frame, pressure) = match (&self.baseline, &self.latest_frame, &self.latest_pressure) {
            (Some(b), Some(f), Some(p)) => (b, f, p),
            _ => return None,
        };
        let (status, details) = assess(&self.config, baseline, frame, pressure);
        Some(self.apply(status, details, now))
    }

    /// Score, cooldown, phase and reschedule for one cycle
    fn apply(
        &mut self,
        status: PostureStatus,
        details: BTreeMap<String, f64>,
        now: Instant,
    ) -> EvaluationOutcome {
        // Half-open window: a bad outcome exactly at `cooldown_until` is penalized
        let cooldown_active = self.cooldown_until.is_some_and(|until| now < until);
        let mut alert = false;
        let mut finished_now = false;

        match status {
            PostureStatus::Good => self.cooldown_until = None,
            s if s.is_bad() => {
                if self.phase != EvaluatorPhase::Finished && !cooldown_active {
                    self.score = self.score.saturating_sub(1);
                    self.cooldown_until = Some(now + self.config.cooldown);
                    alert = true;
                }
            }
            _ => {}
        }

        if self.phase != EvaluatorPhase::Finished {
            if self.score == 0 {
                self.phase = EvaluatorPhase::Finished;
                finished_now = true;
                info!(evaluations = self.evaluations + 1, "Score exhausted, session finished");
            } else {
                self.phase = EvaluatorPhase::Evaluating;
            }
        }

        self.evaluations += 1;
        self.next_eval = Some(now + self.schedule.next_interval());

        let elapsed = self
            .run_start
            .map_or(0.0, |start| now.saturating_duration_since(start).as_secs_f64());

        debug!(
            status = %status,
            score = self.score,
            alert,
            cooldown_active,
            "Evaluation complete"
        );

        EvaluationOutcome {
            result: PostureResult {
                timestamp: Utc::now(),
                status,
                score: self.score,
                elapsed_seconds: elapsed,
                details,
                alert,
                cooldown_active,
            },
            finished_now,
        }
    }
}

/// Compare the latest readings against the baseline
///
/// Channels are checked in precedence order; the first offending one wins.
/// A channel without a usable reading or baseline is skipped, and a cycle
/// with a skipped channel and no offending one is `Unknown`.
fn assess(
    config: &EvaluatorConfig,
    baseline: &CalibrationBaseline,
    frame: &FrameSample,
    pressure: &PressureSample,
) -> (PostureStatus, BTreeMap<String, f64>) {
    let mut details = BTreeMap::new();
    if let Some(left) = frame.eye_distance_left {
        details.insert("eye_distance_left".to_string(), left);
    }
    if let Some(right) = frame.eye_distance_right {
        details.insert("eye_distance_right".to_string(), right);
    }
    let ratio = frame.eye_ratio();
    if let Some(ratio) = ratio {
        details.insert("eye_distance_ratio".to_string(), ratio);
    }
    details.insert("foot_value".to_string(), f64::from(pressure.foot_value));
    details.insert("cushion_value".to_string(), f64::from(pressure.cushion_value));

    let mut offending = None;
    let mut skipped = false;

    for channel in Channel::ALL {
        let Some(base) = baseline.channel(channel) else {
            skipped = true;
            continue;
        };
        let (deviation, threshold, key) = match channel {
            Channel::EyeRatio => {
                let Some(ratio) = ratio else {
                    skipped = true;
                    continue;
                };
                ((ratio - base).abs() / base, config.eye_threshold, "eye_ratio_deviation")
            }
            Channel::Foot => (
                (f64::from(pressure.foot_value) - base).abs(),
                config.pressure_threshold,
                "foot_deviation",
            ),
            Channel::Cushion => (
                (f64::from(pressure.cushion_value) - base).abs(),
                config.pressure_threshold,
                "cushion_deviation",
            ),
        };
        details.insert(key.to_string(), deviation);
        if offending.is_none() && deviation > threshold {
            offending = Some(channel);
        }
    }

    let status = match offending {
        Some(channel) => PostureStatus::for_channel(channel),
        None if skipped => PostureStatus::Unknown,
        None => PostureStatus::Good,
    };
    (status, details)
}
