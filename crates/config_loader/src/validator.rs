//! Config validation
//!
//! Rules:
//! - thresholds > 0
//! - 0 < check_interval_min_s <= check_interval_max_s
//! - cooldown_s >= 0
//! - calibration sample_count >= 1
//! - sampling rates > 0, simulated standard deviations >= 0
//! - sink names non-empty and unique, snapshot sinks carry a `path`

use std::collections::HashSet;

use contracts::{AppConfig, ContractError, SinkType};

/// Validate an AppConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AppConfig) -> Result<(), ContractError> {
    validate_processing(config)?;
    validate_calibration(config)?;
    validate_sensors(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn require_positive(field: &str, value: f64) -> Result<(), ContractError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ContractError::config_validation(
            field,
            format!("must be a finite value > 0, got {value}"),
        ));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> Result<(), ContractError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ContractError::config_validation(
            field,
            format!("must be a finite value >= 0, got {value}"),
        ));
    }
    Ok(())
}

/// Thresholds and timing
fn validate_processing(config: &AppConfig) -> Result<(), ContractError> {
    let p = &config.processing;
    require_positive("processing.eye_distance_threshold", p.eye_distance_threshold)?;
    require_positive("processing.pressure_threshold", p.pressure_threshold)?;
    require_positive("processing.check_interval_min_s", p.check_interval_min_s)?;
    require_positive("processing.check_interval_max_s", p.check_interval_max_s)?;

    if p.check_interval_min_s > p.check_interval_max_s {
        return Err(ContractError::config_validation(
            "processing.check_interval_min_s / processing.check_interval_max_s",
            format!(
                "check_interval_min_s ({}) must be <= check_interval_max_s ({})",
                p.check_interval_min_s, p.check_interval_max_s
            ),
        ));
    }

    require_non_negative("processing.cooldown_s", p.cooldown_s)
}

fn validate_calibration(config: &AppConfig) -> Result<(), ContractError> {
    if config.calibration.sample_count == 0 {
        return Err(ContractError::config_validation(
            "calibration.sample_count",
            "sample_count must be >= 1",
        ));
    }
    Ok(())
}

/// Sampling rates and simulation parameters
fn validate_sensors(config: &AppConfig) -> Result<(), ContractError> {
    let optical = &config.sensors.optical;
    require_positive("sensors.optical.rate_hz", optical.rate_hz)?;
    require_non_negative("sensors.optical.simulated_eye_std", optical.simulated_eye_std)?;

    let pressure = &config.sensors.pressure;
    require_positive("sensors.pressure.rate_hz", pressure.rate_hz)?;
    require_non_negative("sensors.pressure.simulated_foot_std", pressure.simulated_foot_std)?;
    require_non_negative(
        "sensors.pressure.simulated_cushion_std",
        pressure.simulated_cushion_std,
    )?;
    Ok(())
}

fn validate_sinks(config: &AppConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be >= 1",
            ));
        }
        if sink.sink_type == SinkType::Snapshot
            && !matches!(sink.params.get("path"), Some(path) if !path.is_empty())
        {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "snapshot sink requires a 'path' param",
            ));
        }
    }
    Ok(())
}
