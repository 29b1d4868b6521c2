//! `run` command implementation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{AppConfig, SinkConfig, SinkType, SourceMode};
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::commands::load_config;
use crate::pipeline::{Pipeline, PipelineConfig};

const SNAPSHOT_SINK: &str = "snapshot";

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides, then re-check the merged result
    apply_overrides(&mut config, args);
    config_loader::ConfigLoader::validate(&config).context("Invalid configuration after CLI overrides")?;

    info!(
        optical = ?config.sensors.optical.mode,
        pressure = ?config.sensors.pressure.mode,
        sinks = config.sinks.len(),
        auto_calibrate = config.calibration.auto_start,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        auto_calibrate: config.calibration.auto_start,
        app: config,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        exit_on_finish: args.exit_on_finish,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        evaluations = stats.session.total_evaluations,
        penalties = stats.session.penalties,
        finished = stats.finished,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Posture Sentinel finished");
    Ok(())
}

/// Merge command-line flags into the loaded configuration
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if args.simulate {
        info!("Forcing simulated sources");
        config.sensors.optical.mode = SourceMode::Simulated;
        config.sensors.pressure.mode = SourceMode::Simulated;
    }
    if let Some(ref port) = args.serial_port {
        if args.simulate {
            warn!(port = %port.display(), "--serial-port ignored with --simulate");
        } else {
            info!(port = %port.display(), "Overriding pressure pad port from CLI");
            config.sensors.pressure.mode = SourceMode::Hardware;
            config.sensors.pressure.serial_port = Some(port.display().to_string());
        }
    }
    if let Some(ref path) = args.snapshot {
        info!(path = %path.display(), "Writing status snapshot");
        let sink = SinkConfig {
            name: SNAPSHOT_SINK.to_string(),
            sink_type: SinkType::Snapshot,
            queue_capacity: 100,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        };
        match config.sinks.iter_mut().find(|s| s.name == SNAPSHOT_SINK) {
            Some(existing) => *existing = sink,
            None => config.sinks.push(sink),
        }
    }
    if let Some(seed) = args.seed {
        config.processing.interval_seed = Some(seed);
    }
    if args.no_auto_calibrate {
        config.calibration.auto_start = false;
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that fails to install is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, stopping pipeline..."),
        _ = terminate => warn!("Received SIGTERM, stopping pipeline..."),
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AppConfig) {
    let optical = &config.sensors.optical;
    let pressure = &config.sensors.pressure;
    let processing = &config.processing;

    println!("\n=== Configuration Summary ===\n");
    println!("Sensors:");
    println!(
        "  Optical: {:?} (device {}, {} Hz)",
        optical.mode, optical.device_id, optical.rate_hz
    );
    match pressure.serial_port {
        Some(ref port) => println!(
            "  Pressure: {:?} ({}, {} Hz)",
            pressure.mode, port, pressure.rate_hz
        ),
        None => println!("  Pressure: {:?} ({} Hz)", pressure.mode, pressure.rate_hz),
    }

    println!("\nEvaluation:");
    println!("  Eye distance threshold: {}", processing.eye_distance_threshold);
    println!("  Pressure threshold: {}", processing.pressure_threshold);
    println!(
        "  Re-check interval: {}s - {}s",
        processing.check_interval_min_s, processing.check_interval_max_s
    );
    println!("  Cooldown: {}s", processing.cooldown_s);
    if let Some(seed) = processing.interval_seed {
        println!("  Interval seed: {}", seed);
    }

    println!("\nCalibration:");
    println!(
        "  {} samples every {} ms (auto start: {})",
        config.calibration.sample_count,
        config.calibration.sample_interval_ms,
        config.calibration.auto_start
    );

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
