//! Command implementations.

mod info;
mod run;
mod validate;

use std::path::Path;

use contracts::AppConfig;
use tracing::info;

use crate::error::{CliError, Result};

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

/// Load a configuration file, or the built-in defaults when no path is given
pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(AppConfig::default());
    };
    if !path.exists() {
        return Err(CliError::config_not_found(path));
    }
    info!(config = %path.display(), "Loading configuration");
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config.app_name, "Posture Sentinel");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/posture.toml"))).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_config_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[processing]\neye_distance_threshold = -1.0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
