//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, SinkType, SourceMode};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    optical_mode: String,
    pressure_mode: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    optical_mode: format!("{:?}", config.sensors.optical.mode),
                    pressure_mode: format!("{:?}", config.sensors.pressure.mode),
                    sink_count: config.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sinks.is_empty() {
        warnings.push("No sinks configured - results are only logged by the evaluator".to_string());
    } else if !config.sinks.iter().any(|s| s.sink_type == SinkType::Snapshot) {
        warnings.push("No snapshot sink - status will not be written to disk".to_string());
    }

    let pressure = &config.sensors.pressure;
    if pressure.mode == SourceMode::Hardware && pressure.serial_port.is_none() {
        warnings.push(
            "sensors.pressure is hardware without serial_port - simulated readings will be used"
                .to_string(),
        );
    }

    let processing = &config.processing;
    if processing.cooldown_s >= processing.check_interval_max_s {
        warnings.push(format!(
            "processing.cooldown_s ({}) covers the whole re-check interval - consecutive bad checks will never both be penalized",
            processing.cooldown_s
        ));
    }

    if !config.calibration.auto_start {
        warnings.push("calibration.auto_start is off - send a Start command to begin".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Optical: {}", summary.optical_mode);
            println!("  Pressure: {}", summary.pressure_mode);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: PathBuf::from("/nonexistent/posture.toml"),
            json: true,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_file_with_warnings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[sensors.pressure]\nmode = \"hardware\"").unwrap();

        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: false,
        });
        assert!(result.valid);
        assert_eq!(result.summary.unwrap().pressure_mode, "Hardware");
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("serial_port")));
    }

    #[test]
    fn test_cooldown_warning() {
        let mut config = AppConfig::default();
        config.processing.cooldown_s = config.processing.check_interval_max_s;
        assert!(collect_warnings(&config).iter().any(|w| w.contains("cooldown_s")));
    }
}
