//! Pipeline orchestrator - coordinates all components.
//!
//! Startup order: bus subscribers, sinks, evaluator, producers, then the
//! dispatch loop. Shutdown runs in reverse so every queued result still
//! reaches the sinks.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{
    AppConfig, CalibrationBaseline, CommandKind, EventCategory, EventPayload, SystemNotice,
};
use dispatcher::{create_dispatcher, handler_fn, EventBus, EventHandler, HandlerError, Subscription};
use evaluator::{
    run_calibration, CalibrationCapture, EvaluatorConfig, EvaluatorError, EvaluatorService,
    LatestReadings, RandomInterval,
};
use ingestion::IngestionPipeline;
use observability::SessionStatsAggregator;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::stats::StopReason;
use super::PipelineStats;

/// Upper bound for draining the bus at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Loaded application configuration (after CLI overrides)
    pub app: AppConfig,

    /// Session length limit (None = until stopped)
    pub duration: Option<Duration>,

    /// Stop once the score reaches zero
    pub exit_on_finish: bool,

    /// Calibrate as soon as the producers are running
    pub auto_calibrate: bool,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl PipelineConfig {
    pub fn new(app: AppConfig) -> Self {
        let auto_calibrate = app.calibration.auto_start;
        Self {
            app,
            duration: None,
            exit_on_finish: false,
            auto_calibrate,
            metrics_port: None,
        }
    }
}

/// Requests raised by bus handlers for the orchestrator loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Calibrate,
    Stop,
    Finished,
}

type CalibrationTask = JoinHandle<std::result::Result<CalibrationBaseline, EvaluatorError>>;

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, a `Stop` command arrives, the duration
    /// elapses or (with `exit_on_finish`) the session finishes
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let app = &self.config.app;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let bus = EventBus::new();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Mutex::new(SessionStatsAggregator::new()));

        let mut subscriptions =
            subscribe_session_stats(&bus, Arc::clone(&session), control_tx.clone());
        subscriptions.push(subscribe_commands(&bus, control_tx));

        let dispatcher =
            create_dispatcher(app.sinks.clone(), &bus).context("Failed to create sinks")?;

        let readings = LatestReadings::new();
        subscriptions.extend(readings.attach(&bus));

        let schedule = RandomInterval::from_config(&app.processing)
            .context("Invalid re-check interval bounds")?;
        let evaluator =
            EvaluatorService::spawn(&bus, EvaluatorConfig::from(&app.processing), schedule);

        let mut ingestion = IngestionPipeline::from_config(&bus, &app.sensors)
            .context("Failed to resolve sensor sources")?;

        bus.start().await.context("Failed to start event bus")?;
        ingestion.start().context("Failed to start producers")?;

        info!(
            app = %app.app_name,
            optical = ?app.sensors.optical.mode,
            pressure = ?app.sensors.pressure.mode,
            sinks = app.sinks.len(),
            "Pipeline running"
        );

        let capture = CalibrationCapture::from_config(&app.calibration);
        let mut calibration: Option<CalibrationTask> = None;
        let mut calibrations = 0u64;
        let mut finished = false;

        if self.config.auto_calibrate {
            calibration = Some(spawn_calibration(&bus, &readings, capture));
        }

        let deadline = self.config.duration;
        let timeout = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);
        tokio::pin!(shutdown);

        let stop_reason = loop {
            tokio::select! {
                _ = &mut shutdown => break StopReason::Signal,
                _ = &mut timeout => break StopReason::Timeout,
                joined = join_calibration(&mut calibration), if calibration.is_some() => {
                    calibration = None;
                    match joined {
                        Ok(Ok(baseline)) => {
                            calibrations += 1;
                            info!(
                                completed = baseline.completed,
                                invalid = ?baseline.invalid_channels(),
                                "Calibration finished"
                            );
                        }
                        Ok(Err(e)) => warn!(error = %e, "Calibration aborted"),
                        Err(e) => warn!(error = %e, "Calibration task failed"),
                    }
                }
                control = control_rx.recv() => match control {
                    Some(Control::Calibrate) => {
                        if calibration.is_some() {
                            debug!("Calibration already in progress");
                        } else {
                            calibration = Some(spawn_calibration(&bus, &readings, capture));
                        }
                    }
                    Some(Control::Finished) => {
                        finished = true;
                        if self.config.exit_on_finish {
                            break StopReason::Finished;
                        }
                    }
                    Some(Control::Stop) => break StopReason::Command,
                    // Both senders live in subscriptions we still hold
                    None => break StopReason::Command,
                },
            }
        };

        info!(reason = %stop_reason, "Shutting down pipeline");
        if let Err(e) = bus.publish(SystemNotice::ShuttingDown) {
            debug!(error = %e, "Shutdown notice not published");
        }
        if let Some(task) = calibration.take() {
            task.abort();
        }

        let producers = ingestion
            .metrics()
            .into_iter()
            .map(|(name, m)| (name, m.samples_published, m.fell_back))
            .collect();
        ingestion.stop().await;

        let final_score = evaluator.score();
        evaluator.shutdown().await;

        if !bus.wait_idle(DRAIN_TIMEOUT).await {
            warn!(pending = bus.metrics().pending(), "Bus did not drain before shutdown");
        }
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        bus.stop().await;

        let sinks = dispatcher
            .metrics()
            .into_iter()
            .map(|(name, m)| (name, m.write_count, m.dropped_count))
            .collect();
        dispatcher.shutdown().await;

        let mut summary = session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary();
        summary.last_score.get_or_insert(final_score);

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            stop_reason,
            calibrations,
            finished,
            session: summary,
            bus: bus.metrics(),
            producers,
            sinks,
        })
    }
}

fn spawn_calibration(
    bus: &EventBus,
    readings: &Arc<LatestReadings>,
    capture: CalibrationCapture,
) -> CalibrationTask {
    let bus = bus.clone();
    let readings = Arc::clone(readings);
    info!(samples = capture.sample_count(), "Starting calibration");
    tokio::spawn(async move { run_calibration(&bus, readings.as_ref(), &capture).await })
}

async fn join_calibration(
    task: &mut Option<CalibrationTask>,
) -> std::result::Result<std::result::Result<CalibrationBaseline, EvaluatorError>, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Aggregate results and watch for the end of the session
fn subscribe_session_stats(
    bus: &EventBus,
    session: Arc<Mutex<SessionStatsAggregator>>,
    control: mpsc::UnboundedSender<Control>,
) -> Vec<Subscription> {
    let handler: Arc<dyn EventHandler> = Arc::new(handler_fn("session_stats", move |event| {
        let session = Arc::clone(&session);
        let control = control.clone();
        async move {
            match event.payload() {
                EventPayload::PostureResult(result) => {
                    session
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .update(result);
                }
                EventPayload::System(SystemNotice::SessionFinished {
                    score,
                    elapsed_seconds,
                }) => {
                    info!(score, elapsed_seconds, "Posture session finished");
                    let _ = control.send(Control::Finished);
                }
                _ => {}
            }
            Ok(())
        }
    }));

    [EventCategory::PostureResult, EventCategory::System]
        .into_iter()
        .map(|category| bus.subscribe_shared(category, Arc::clone(&handler)))
        .collect()
}

/// Translate lifecycle commands into orchestrator requests
///
/// `Restart` is also handled by the evaluator, which drops its baseline;
/// here it only schedules the fresh calibration.
fn subscribe_commands(bus: &EventBus, control: mpsc::UnboundedSender<Control>) -> Subscription {
    bus.subscribe(
        EventCategory::Command,
        handler_fn("command_router", move |event| {
            let control = control.clone();
            async move {
                let EventPayload::Command(command) = event.payload() else {
                    return Ok(());
                };
                let request = match command.kind {
                    CommandKind::Start | CommandKind::Calibrate | CommandKind::Restart => {
                        Control::Calibrate
                    }
                    CommandKind::Stop => Control::Stop,
                };
                debug!(kind = ?command.kind, "Command received");
                control
                    .send(request)
                    .map_err(|_| HandlerError::new("command_router", "orchestrator is gone"))
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Command, SinkConfig, SinkType, SourceMode};
    use std::collections::HashMap;

    fn fast_app(snapshot: Option<&std::path::Path>) -> AppConfig {
        let mut app = AppConfig::default();
        app.sensors.optical.mode = SourceMode::Simulated;
        app.sensors.optical.rate_hz = 100.0;
        app.sensors.pressure.mode = SourceMode::Simulated;
        app.sensors.pressure.rate_hz = 100.0;
        app.calibration.sample_count = 3;
        app.calibration.sample_interval_ms = 10;
        app.calibration.warmup_ms = 20;
        app.processing.check_interval_min_s = 0.02;
        app.processing.check_interval_max_s = 0.05;
        app.processing.interval_seed = Some(7);
        app.sinks = match snapshot {
            Some(path) => vec![SinkConfig {
                name: "snapshot".to_string(),
                sink_type: SinkType::Snapshot,
                queue_capacity: 64,
                params: HashMap::from([("path".to_string(), path.display().to_string())]),
            }],
            None => Vec::new(),
        };
        app
    }

    #[tokio::test]
    async fn test_run_until_duration_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("status.json");

        let mut config = PipelineConfig::new(fast_app(Some(&snapshot)));
        config.duration = Some(Duration::from_millis(600));

        let stats = Pipeline::new(config)
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.stop_reason, StopReason::Timeout);
        assert_eq!(stats.calibrations, 1);
        assert!(stats.session.total_evaluations > 0);
        assert!(stats.bus.published > 0);
        assert_eq!(stats.producers.len(), 2);
        assert!(stats.producers.iter().all(|(_, published, _)| *published > 0));

        let content = std::fs::read_to_string(&snapshot).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["calibration_complete"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_pipeline() {
        let mut config = PipelineConfig::new(fast_app(None));
        config.auto_calibrate = false;

        let stats = Pipeline::new(config)
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(stats.stop_reason, StopReason::Signal);
        assert_eq!(stats.calibrations, 0);
        assert_eq!(stats.session.total_evaluations, 0);
        assert!(!stats.finished);
    }

    #[tokio::test]
    async fn test_command_router_translates_kinds() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = subscribe_commands(&bus, tx);
        bus.start().await.unwrap();

        for kind in [
            CommandKind::Start,
            CommandKind::Restart,
            CommandKind::Calibrate,
            CommandKind::Stop,
        ] {
            bus.publish(Command::new(kind)).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..4 {
            let next = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap();
            received.push(next.unwrap());
        }
        bus.stop().await;

        assert_eq!(
            received,
            vec![
                Control::Calibrate,
                Control::Calibrate,
                Control::Calibrate,
                Control::Stop
            ]
        );
    }
}
