//! Config parsing
//!
//! TOML (primary) and JSON formats.

use contracts::{AppConfig, ContractError};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML config
pub fn parse_toml(content: &str) -> Result<AppConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON config
pub fn parse_json(content: &str) -> Result<AppConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse by format
pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkType, SourceMode};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
app_name = "desk"

[sensors.pressure]
mode = "hardware"
serial_port = "/dev/ttyUSB0"
fallback_after = 3

[processing]
pressure_threshold = 150.0
interval_seed = 7

[[sinks]]
name = "status"
sink_type = "snapshot"
params = { path = "/tmp/status.json" }
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.app_name, "desk");
        assert_eq!(config.sensors.pressure.mode, SourceMode::Hardware);
        assert_eq!(config.sensors.pressure.fallback_after, 3);
        assert_eq!(config.sensors.optical.mode, SourceMode::Simulated);
        assert_eq!(config.processing.pressure_threshold, 150.0);
        assert_eq!(config.processing.eye_distance_threshold, 0.1);
        assert_eq!(config.processing.interval_seed, Some(7));
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].sink_type, SinkType::Snapshot);
        assert_eq!(config.sinks[0].queue_capacity, 100);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "calibration": { "sample_count": 5 },
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.calibration.sample_count, 5);
        assert_eq!(config.calibration.sample_interval_ms, 100);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_unknown_sink_type() {
        let content = r#"
[[sinks]]
name = "x"
sink_type = "carrier_pigeon"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
