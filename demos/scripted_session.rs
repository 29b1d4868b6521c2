//! Scripted Session Example
//!
//! Replays a pressure-pad capture (good posture, then leaning on the
//! footrest) next to a simulated optical source. When the capture runs out
//! the pad producer falls back to simulated readings.
//!
//! Run with: cargo run -p posture_demos --bin scripted_session [config.toml]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use config_loader::ConfigLoader;
use contracts::{
    AppConfig, EventCategory, EventPayload, FrameSource, PressureSource, SystemNotice,
};
use dispatcher::{create_dispatcher, handler_fn, EventBus};
use evaluator::{
    run_calibration, CalibrationCapture, EvaluatorConfig, EvaluatorService, FixedInterval,
    LatestReadings,
};
use ingestion::{
    IngestionPipeline, LinePressureSource, ProducerConfig, SimulatedFrameSource,
    SimulatedPressureSource,
};
use observability::{ObservabilityConfig, SessionStatsAggregator};

const GOOD_LINES: usize = 60;
const LEANING_LINES: usize = 140;

fn pad_capture() -> String {
    let mut capture = String::new();
    for i in 0..GOOD_LINES {
        capture.push_str(&format!("{},{}\n", 495 + i % 10, 505 - i % 10));
    }
    for i in 0..LEANING_LINES {
        capture.push_str(&format!("{},{}\n", 780 + i % 20, 480));
    }
    capture
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    observability::init_with_config(ObservabilityConfig::pretty())?;

    tracing::info!("Starting Scripted Session Demo");

    // ==== Stage 1: Use default config or load from file ====
    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading config");
            ConfigLoader::load_from_path(std::path::Path::new(&path))?
        }
        None => AppConfig::default(),
    };

    // ==== Stage 2: Bus, sinks and session statistics ====
    let bus = EventBus::new();
    let dispatcher = create_dispatcher(config.sinks.clone(), &bus)?;

    let stats = Arc::new(Mutex::new(SessionStatsAggregator::new()));
    let collector = Arc::clone(&stats);
    let _results = bus.subscribe(
        EventCategory::PostureResult,
        handler_fn("demo_stats", move |event| {
            if let EventPayload::PostureResult(result) = event.payload() {
                if let Ok(mut stats) = collector.lock() {
                    stats.update(result);
                }
            }
            async { Ok(()) }
        }),
    );

    let (finished_tx, mut finished_rx) = tokio::sync::mpsc::unbounded_channel();
    let _notices = bus.subscribe(
        EventCategory::System,
        handler_fn("demo_finish", move |event| {
            if let EventPayload::System(SystemNotice::SessionFinished { .. }) = event.payload() {
                let _ = finished_tx.send(());
            }
            async { Ok(()) }
        }),
    );

    // ==== Stage 3: Evaluator and calibration readings ====
    let readings = LatestReadings::new();
    let _reading_subs = readings.attach(&bus);
    let evaluator_config = EvaluatorConfig {
        cooldown: Duration::from_millis(400),
        ..EvaluatorConfig::from(&config.processing)
    };
    let service = EvaluatorService::spawn(
        &bus,
        evaluator_config,
        FixedInterval::new(Duration::from_millis(250))?,
    );

    // ==== Stage 4: Sources ====
    let optical = &config.sensors.optical;
    let pad = &config.sensors.pressure;
    let frames: Box<dyn FrameSource> = Box::new(SimulatedFrameSource::with_seed(
        optical.simulated_eye_mean,
        optical.simulated_eye_std,
        7,
    )?);
    let capture: Box<dyn PressureSource> =
        Box::new(LinePressureSource::new("pad_capture", Cursor::new(pad_capture()))?);
    let fallback: Box<dyn PressureSource> = Box::new(SimulatedPressureSource::with_seed(
        (pad.simulated_foot_mean, pad.simulated_foot_std),
        (pad.simulated_cushion_mean, pad.simulated_cushion_std),
        11,
    )?);

    let mut ingestion = IngestionPipeline::from_sources(
        &bus,
        (frames, None, ProducerConfig::new("optical_sim", 30.0, 3)?),
        (capture, Some(fallback), ProducerConfig::new("pad_capture", 20.0, 3)?),
    );

    // ==== Stage 5: Start, calibrate, monitor ====
    bus.start().await?;
    ingestion.start()?;

    let calibration = CalibrationCapture::new(10, Duration::from_millis(50))
        .with_warmup(Duration::from_millis(200));
    let baseline = run_calibration(&bus, readings.as_ref(), &calibration).await?;
    tracing::info!(
        foot = ?baseline.baseline_foot,
        cushion = ?baseline.baseline_cushion,
        eye_ratio = ?baseline.baseline_eye_ratio,
        "Baseline captured"
    );

    tokio::select! {
        _ = finished_rx.recv() => tracing::info!("Score reached zero"),
        _ = tokio::time::sleep(Duration::from_secs(15)) => tracing::info!("Demo time elapsed"),
    }

    // ==== Stage 6: Cleanup ====
    tracing::info!("Shutting down and cleaning up...");
    ingestion.stop().await;
    let score = service.score();
    service.shutdown().await;
    bus.wait_idle(Duration::from_secs(1)).await;
    bus.stop().await;
    dispatcher.shutdown().await;

    tracing::info!(score, "Demo finished");
    if let Ok(stats) = stats.lock() {
        println!("{}", stats.summary());
    }

    Ok(())
}
