//! Calibration capture
//!
//! Samples the live readings for a short window while the user holds a good
//! posture and averages them into a [`CalibrationBaseline`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use contracts::{
    CalibrationBaseline, CalibrationConfig, Channel, EventCategory, EventPayload, FrameSample,
    PressureSample, SystemNotice,
};
use dispatcher::{handler_fn, EventBus, Subscription};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::EvaluatorError;

/// Source of the most recent readings
pub trait ReadingProvider: Send + Sync {
    fn latest_frame(&self) -> Option<FrameSample>;
    fn latest_pressure(&self) -> Option<PressureSample>;
}

impl<T: ReadingProvider + ?Sized> ReadingProvider for Arc<T> {
    fn latest_frame(&self) -> Option<FrameSample> {
        (**self).latest_frame()
    }

    fn latest_pressure(&self) -> Option<PressureSample> {
        (**self).latest_pressure()
    }
}

/// Per-channel running sums
#[derive(Debug, Default)]
pub struct BaselineAccumulator {
    eye_ratio: (f64, usize),
    foot: (f64, usize),
    cushion: (f64, usize),
}

impl BaselineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample; missing values are excluded from their channel
    pub fn push(&mut self, frame: Option<&FrameSample>, pressure: Option<&PressureSample>) {
        if let Some(ratio) = frame.and_then(FrameSample::eye_ratio) {
            self.eye_ratio.0 += ratio;
            self.eye_ratio.1 += 1;
        }
        if let Some(p) = pressure {
            self.foot.0 += f64::from(p.foot_value);
            self.foot.1 += 1;
            self.cushion.0 += f64::from(p.cushion_value);
            self.cushion.1 += 1;
        }
    }

    /// Mean of each channel; a channel with no samples is `None`
    pub fn finish(self) -> CalibrationBaseline {
        fn mean((sum, n): (f64, usize)) -> Option<f64> {
            (n > 0).then(|| sum / n as f64)
        }

        CalibrationBaseline {
            timestamp: Utc::now(),
            baseline_foot: mean(self.foot),
            baseline_cushion: mean(self.cushion),
            baseline_eye_ratio: mean(self.eye_ratio),
            completed: true,
            samples_used: BTreeMap::from([
                (Channel::EyeRatio, self.eye_ratio.1),
                (Channel::Foot, self.foot.1),
                (Channel::Cushion, self.cushion.1),
            ]),
        }
    }
}

/// Timed baseline capture
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCapture {
    sample_count: usize,
    interval: Duration,
    warmup: Duration,
}

impl Default for CalibrationCapture {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

impl CalibrationCapture {
    pub fn new(sample_count: usize, interval: Duration) -> Self {
        Self {
            sample_count: sample_count.max(1),
            interval: interval.max(Duration::from_millis(1)),
            warmup: Duration::ZERO,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.sample_count, config.sample_interval()).with_warmup(config.warmup())
    }

    /// Wait before the first sample
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Pull `sample_count` readings spaced by `interval` and average them
    #[instrument(
        name = "calibration_capture",
        skip(self, provider),
        fields(samples = self.sample_count, interval_ms = self.interval.as_millis() as u64)
    )]
    pub async fn capture<P: ReadingProvider + ?Sized>(&self, provider: &P) -> CalibrationBaseline {
        if !self.warmup.is_zero() {
            tokio::time::sleep(self.warmup).await;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut acc = BaselineAccumulator::new();
        for i in 0..self.sample_count {
            ticker.tick().await;
            let frame = provider.latest_frame();
            let pressure = provider.latest_pressure();
            debug!(
                sample = i,
                has_frame = frame.is_some(),
                has_pressure = pressure.is_some(),
                "Calibration sample"
            );
            acc.push(frame.as_ref(), pressure.as_ref());
        }

        let baseline = acc.finish();
        let invalid = baseline.invalid_channels();
        if invalid.is_empty() {
            info!(
                foot = ?baseline.baseline_foot,
                cushion = ?baseline.baseline_cushion,
                eye_ratio = ?baseline.baseline_eye_ratio,
                "Calibration captured"
            );
        } else {
            warn!(invalid_channels = ?invalid, "Calibration captured with unusable channels");
        }
        baseline
    }
}

/// Bus-fed cache of the latest frame and pressure sample
#[derive(Debug, Default)]
pub struct LatestReadings {
    frame: Mutex<Option<FrameSample>>,
    pressure: Mutex<Option<PressureSample>>,
}

impl LatestReadings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to frame and pressure events
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let frames = Arc::clone(self);
        let pressures = Arc::clone(self);
        vec![
            bus.subscribe(
                EventCategory::Frame,
                handler_fn("latest_frame", move |event| {
                    if let EventPayload::Frame(frame) = event.into_payload() {
                        frames.set_frame(frame);
                    }
                    async { Ok(()) }
                }),
            ),
            bus.subscribe(
                EventCategory::Pressure,
                handler_fn("latest_pressure", move |event| {
                    if let EventPayload::Pressure(sample) = event.into_payload() {
                        pressures.set_pressure(sample);
                    }
                    async { Ok(()) }
                }),
            ),
        ]
    }

    pub fn set_frame(&self, frame: FrameSample) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn set_pressure(&self, sample: PressureSample) {
        *self.pressure.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }
}

impl ReadingProvider for LatestReadings {
    fn latest_frame(&self) -> Option<FrameSample> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn latest_pressure(&self) -> Option<PressureSample> {
        *self.pressure.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Announce, capture and publish a baseline
#[instrument(name = "run_calibration", skip_all)]
pub async fn run_calibration<P: ReadingProvider + ?Sized>(
    bus: &EventBus,
    provider: &P,
    capture: &CalibrationCapture,
) -> Result<CalibrationBaseline, EvaluatorError> {
    bus.publish(SystemNotice::CalibrationStarted)?;
    let baseline = capture.capture(provider).await;
    observability::metrics::record_calibration(&baseline);
    bus.publish(baseline.clone())?;
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SampleOrigin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider replaying a fixed script, one entry per read
    struct Scripted {
        frames: Vec<Option<FrameSample>>,
        pressures: Vec<Option<PressureSample>>,
        frame_reads: AtomicUsize,
        pressure_reads: AtomicUsize,
    }

    impl Scripted {
        fn new(frames: Vec<Option<FrameSample>>, pressures: Vec<Option<PressureSample>>) -> Self {
            Self {
                frames,
                pressures,
                frame_reads: AtomicUsize::new(0),
                pressure_reads: AtomicUsize::new(0),
            }
        }
    }

    impl ReadingProvider for Scripted {
        fn latest_frame(&self) -> Option<FrameSample> {
            let i = self.frame_reads.fetch_add(1, Ordering::Relaxed);
            self.frames.get(i).cloned().flatten()
        }

        fn latest_pressure(&self) -> Option<PressureSample> {
            let i = self.pressure_reads.fetch_add(1, Ordering::Relaxed);
            self.pressures.get(i).copied().flatten()
        }
    }

    fn pressure(foot: i64, cushion: i64) -> Option<PressureSample> {
        Some(PressureSample::new(foot, cushion, SampleOrigin::Simulated))
    }

    fn capture(samples: usize) -> CalibrationCapture {
        CalibrationCapture::new(samples, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_capture_averages_channels() {
        let provider = Scripted::new(
            vec![
                Some(FrameSample::new(1, Some(0.06), Some(0.05))),
                Some(FrameSample::new(2, Some(0.04), Some(0.05))),
            ],
            vec![pressure(400, 600), pressure(600, 400)],
        );

        let baseline = capture(2).capture(&provider).await;
        assert!(baseline.completed);
        assert_eq!(baseline.baseline_foot, Some(500.0));
        assert_eq!(baseline.baseline_cushion, Some(500.0));
        assert!((baseline.baseline_eye_ratio.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(provider.frame_reads.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_missing_samples_are_excluded() {
        let provider = Scripted::new(
            vec![
                None,
                Some(FrameSample::new(2, Some(0.05), None)),
                Some(FrameSample::new(3, Some(0.06), Some(0.05))),
            ],
            vec![None, pressure(300, 700), None],
        );

        let baseline = capture(3).capture(&provider).await;
        assert_eq!(baseline.baseline_foot, Some(300.0));
        assert!((baseline.baseline_eye_ratio.unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(baseline.samples_used[&Channel::EyeRatio], 1);
        assert_eq!(baseline.samples_used[&Channel::Foot], 1);
    }

    #[tokio::test]
    async fn test_channel_without_samples_is_invalid() {
        let provider = Scripted::new(vec![None; 4], vec![pressure(500, 500); 4]);
        let baseline = capture(4).capture(&provider).await;

        assert!(baseline.completed);
        assert_eq!(baseline.baseline_eye_ratio, None);
        assert_eq!(baseline.invalid_channels(), vec![Channel::EyeRatio]);
    }

    #[test]
    fn test_zero_sample_count_takes_one() {
        assert_eq!(CalibrationCapture::new(0, Duration::ZERO).sample_count(), 1);
    }

    #[tokio::test]
    async fn test_latest_readings_follow_bus() {
        let bus = EventBus::new();
        let readings = LatestReadings::new();
        let subscriptions = readings.attach(&bus);
        bus.start().await.unwrap();

        bus.publish(FrameSample::new(7, Some(0.05), Some(0.05))).unwrap();
        bus.publish(PressureSample::new(420, 510, SampleOrigin::Simulated))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while readings.latest_pressure().is_none() || readings.latest_frame().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(readings.latest_frame().unwrap().frame_sequence_id, 7);
        assert_eq!(readings.latest_pressure().unwrap().foot_value, 420);

        bus.stop().await;
        for s in subscriptions {
            assert!(s.unsubscribe());
        }
    }

    #[tokio::test]
    async fn test_run_calibration_publishes_notice_then_baseline() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for category in [EventCategory::System, EventCategory::Calibration] {
            let seen = Arc::clone(&seen);
            let _ = bus.subscribe(
                category,
                handler_fn("recorder", move |event| {
                    seen.lock().unwrap().push(event.category());
                    async { Ok(()) }
                }),
            );
        }

        let readings = LatestReadings::new();
        readings.set_frame(FrameSample::new(1, Some(0.05), Some(0.05)));
        readings.set_pressure(PressureSample::new(500, 500, SampleOrigin::Simulated));

        let baseline = run_calibration(&bus, &readings, &capture(3)).await.unwrap();
        assert_eq!(baseline.baseline_foot, Some(500.0));

        bus.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        bus.stop().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventCategory::System, EventCategory::Calibration]
        );
    }
}
