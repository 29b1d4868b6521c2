//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{AppConfig, OpticalConfig, PressureConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::commands::load_config;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    app_name: String,
    sensors: Vec<SensorInfo>,
    evaluation: EvaluationInfo,
    calibration: CalibrationInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    id: String,
    mode: String,
    rate_hz: f64,
    fallback_after: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    simulation: HashMap<String, f64>,
}

#[derive(Serialize)]
struct EvaluationInfo {
    eye_distance_threshold: f64,
    pressure_threshold: f64,
    check_interval_s: (f64, f64),
    cooldown_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval_seed: Option<u64>,
}

#[derive(Serialize)]
struct CalibrationInfo {
    sample_count: usize,
    sample_interval_ms: u64,
    warmup_ms: u64,
    auto_start: bool,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    info!("Loaded configuration info");

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn optical_info(optical: &OpticalConfig, detailed: bool) -> SensorInfo {
    SensorInfo {
        id: "optical".to_string(),
        mode: format!("{:?}", optical.mode),
        rate_hz: optical.rate_hz,
        fallback_after: optical.fallback_after,
        device: Some(format!("camera{}", optical.device_id)),
        simulation: if detailed {
            HashMap::from([
                ("eye_mean".to_string(), optical.simulated_eye_mean),
                ("eye_std".to_string(), optical.simulated_eye_std),
            ])
        } else {
            HashMap::new()
        },
    }
}

fn pressure_info(pressure: &PressureConfig, detailed: bool) -> SensorInfo {
    SensorInfo {
        id: "pressure".to_string(),
        mode: format!("{:?}", pressure.mode),
        rate_hz: pressure.rate_hz,
        fallback_after: pressure.fallback_after,
        device: pressure.serial_port.clone(),
        simulation: if detailed {
            HashMap::from([
                ("foot_mean".to_string(), pressure.simulated_foot_mean),
                ("foot_std".to_string(), pressure.simulated_foot_std),
                ("cushion_mean".to_string(), pressure.simulated_cushion_mean),
                ("cushion_std".to_string(), pressure.simulated_cushion_std),
            ])
        } else {
            HashMap::new()
        },
    }
}

fn build_config_info(config: &AppConfig, args: &InfoArgs) -> ConfigInfo {
    let processing = &config.processing;
    let calibration = &config.calibration;

    let sinks = if args.sinks {
        config
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        app_name: config.app_name.clone(),
        sensors: vec![
            optical_info(&config.sensors.optical, args.sensors),
            pressure_info(&config.sensors.pressure, args.sensors),
        ],
        evaluation: EvaluationInfo {
            eye_distance_threshold: processing.eye_distance_threshold,
            pressure_threshold: processing.pressure_threshold,
            check_interval_s: (processing.check_interval_min_s, processing.check_interval_max_s),
            cooldown_s: processing.cooldown_s,
            interval_seed: processing.interval_seed,
        },
        calibration: CalibrationInfo {
            sample_count: calibration.sample_count,
            sample_interval_ms: calibration.sample_interval_ms,
            warmup_ms: calibration.warmup_ms,
            auto_start: calibration.auto_start,
        },
        sinks,
    }
}

fn print_config_info(config: &AppConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Posture Sentinel Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("App");
    println!("   ├─ Version: {:?}", config.version);
    println!("   └─ Name: {}", config.app_name);

    let sensors = [
        optical_info(&config.sensors.optical, args.sensors),
        pressure_info(&config.sensors.pressure, args.sensors),
    ];
    println!("\nSensors ({})", sensors.len());
    for (i, sensor) in sensors.iter().enumerate() {
        let is_last = i == sensors.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({}, {} Hz, fallback after {} misses)",
            prefix, sensor.id, sensor.mode, sensor.rate_hz, sensor.fallback_after
        );
        if let Some(ref device) = sensor.device {
            println!("   {}  ├─ device: {}", child_prefix, device);
        }
        let mut params: Vec<_> = sensor.simulation.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in params {
            println!("   {}  ├─ {}: {}", child_prefix, key, value);
        }
    }

    let processing = &config.processing;
    println!("\nEvaluation");
    println!("   ├─ Eye distance threshold: {}", processing.eye_distance_threshold);
    println!("   ├─ Pressure threshold: {}", processing.pressure_threshold);
    println!(
        "   ├─ Re-check interval: {}s - {}s",
        processing.check_interval_min_s, processing.check_interval_max_s
    );
    match processing.interval_seed {
        Some(seed) => {
            println!("   ├─ Cooldown: {}s", processing.cooldown_s);
            println!("   └─ Interval seed: {}", seed);
        }
        None => println!("   └─ Cooldown: {}s", processing.cooldown_s),
    }

    let calibration = &config.calibration;
    println!("\nCalibration");
    println!(
        "   ├─ Samples: {} every {} ms",
        calibration.sample_count, calibration.sample_interval_ms
    );
    println!("   ├─ Warmup: {} ms", calibration.warmup_ms);
    println!("   └─ Auto start: {}", calibration.auto_start);

    if !config.sinks.is_empty() {
        println!("\nSinks ({})", config.sinks.len());
        for (i, sink) in config.sinks.iter().enumerate() {
            let is_last = i == config.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            if args.sinks {
                println!(
                    "   {} {} ({:?}, queue {}) {:?}",
                    prefix, sink.name, sink.sink_type, sink.queue_capacity, sink.params
                );
            } else {
                println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
            }
        }
    }

    println!();
}
