//! Producer tasks
//!
//! One task per source polls at a fixed rate and publishes whatever it gets.
//! After `fallback_after` consecutive empty or failed polls the task swaps in
//! its simulated stand-in (if it has one) and announces the switch once.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, Event, FrameSample, FrameSource, OpticalConfig, PressureConfig, PressureSample,
    PressureSource, SampleOrigin, SystemNotice,
};
use dispatcher::EventBus;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::IngestionMetrics;

/// Polling cadence and fallback threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerConfig {
    period: Duration,
    fallback_after: u32,
}

impl ProducerConfig {
    pub fn new(source_name: &str, rate_hz: f64, fallback_after: u32) -> Result<Self> {
        let period = (rate_hz.is_finite() && rate_hz > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / rate_hz).ok())
            .flatten()
            .filter(|p| !p.is_zero())
            .ok_or_else(|| IngestionError::InvalidRate {
                source_name: source_name.to_string(),
                rate_hz,
            })?;
        Ok(Self {
            period,
            fallback_after: fallback_after.max(1),
        })
    }

    pub fn for_optical(config: &OpticalConfig) -> Result<Self> {
        Self::new("optical", config.rate_hz, config.fallback_after)
    }

    pub fn for_pressure(config: &PressureConfig) -> Result<Self> {
        Self::new("pressure", config.rate_hz, config.fallback_after)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn fallback_after(&self) -> u32 {
        self.fallback_after
    }
}

/// Uniform view over frame and pressure sources
trait Polled: Send + 'static {
    type Sample: Into<Event> + Send;

    fn label(&self) -> &str;
    fn origin(&self) -> SampleOrigin;
    fn poll(&mut self) -> std::result::Result<Option<Self::Sample>, ContractError>;
}

impl Polled for Box<dyn FrameSource> {
    type Sample = FrameSample;

    fn label(&self) -> &str {
        self.name()
    }

    fn origin(&self) -> SampleOrigin {
        FrameSource::origin(self)
    }

    fn poll(&mut self) -> std::result::Result<Option<FrameSample>, ContractError> {
        self.poll_frame()
    }
}

impl Polled for Box<dyn PressureSource> {
    type Sample = PressureSample;

    fn label(&self) -> &str {
        self.name()
    }

    fn origin(&self) -> SampleOrigin {
        PressureSource::origin(self)
    }

    fn poll(&mut self) -> std::result::Result<Option<PressureSample>, ContractError> {
        self.poll_pressure()
    }
}

/// Handle to a running producer task
pub struct ProducerHandle {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    metrics: Arc<IngestionMetrics>,
}

impl ProducerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(producer = %self.name, error = %e, "Producer task failed");
        }
        debug!(producer = %self.name, "Producer stopped");
    }
}

/// Spawn an optical producer
pub fn spawn_frame_producer(
    bus: &EventBus,
    primary: Box<dyn FrameSource>,
    fallback: Option<Box<dyn FrameSource>>,
    config: ProducerConfig,
    cancel: CancellationToken,
) -> ProducerHandle {
    spawn_producer(bus, primary, fallback, config, cancel)
}

/// Spawn a pressure producer
pub fn spawn_pressure_producer(
    bus: &EventBus,
    primary: Box<dyn PressureSource>,
    fallback: Option<Box<dyn PressureSource>>,
    config: ProducerConfig,
    cancel: CancellationToken,
) -> ProducerHandle {
    spawn_producer(bus, primary, fallback, config, cancel)
}

fn spawn_producer<P: Polled>(
    bus: &EventBus,
    primary: P,
    fallback: Option<P>,
    config: ProducerConfig,
    cancel: CancellationToken,
) -> ProducerHandle {
    let name = primary.label().to_string();
    let metrics = Arc::new(IngestionMetrics::new());
    let task = tokio::spawn(run_producer(
        bus.clone(),
        primary,
        fallback,
        config,
        cancel.clone(),
        Arc::clone(&metrics),
    ));
    ProducerHandle {
        name,
        cancel,
        task,
        metrics,
    }
}

async fn run_producer<P: Polled>(
    bus: EventBus,
    mut active: P,
    mut fallback: Option<P>,
    config: ProducerConfig,
    cancel: CancellationToken,
    metrics: Arc<IngestionMetrics>,
) {
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;

    info!(
        producer = %active.label(),
        origin = ?active.origin(),
        period_ms = config.period.as_millis() as u64,
        "Producer started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match active.poll() {
            Ok(Some(sample)) => {
                failures = 0;
                if let Err(e) = bus.publish(sample) {
                    warn!(producer = %active.label(), error = %e, "Bus closed, producer exiting");
                    break;
                }
                metrics.record_published();
                observability::metrics::record_sample_published(
                    active.label(),
                    active.origin() == SampleOrigin::Simulated,
                );
            }
            Ok(None) => {
                failures = failures.saturating_add(1);
                metrics.record_unavailable();
                observability::metrics::record_source_unavailable(active.label());
                trace!(producer = %active.label(), failures, "Source unavailable");
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                metrics.record_read_error();
                observability::metrics::record_source_unavailable(active.label());
                warn!(producer = %active.label(), failures, error = %e, "Source read failed");
            }
        }

        if failures >= config.fallback_after {
            if let Some(stand_in) = fallback.take() {
                let source = active.label().to_string();
                warn!(
                    producer = %source,
                    stand_in = %stand_in.label(),
                    consecutive_failures = failures,
                    "Switching to simulated samples"
                );
                if let Err(e) = bus.publish(SystemNotice::SourceDegraded {
                    source: source.clone(),
                    consecutive_failures: failures,
                }) {
                    warn!(producer = %source, error = %e, "Could not announce fallback");
                }
                metrics.record_fallback();
                observability::metrics::record_source_fallback(&source);
                active = stand_in;
                failures = 0;
            }
        }
    }

    debug!(producer = %active.label(), "Producer loop exited");
}
