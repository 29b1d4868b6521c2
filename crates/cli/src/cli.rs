//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Posture Sentinel - sensor-driven sitting posture monitor
#[derive(Parser, Debug)]
#[command(
    name = "posture-sentinel",
    author,
    version,
    about = "Sitting posture monitor driven by optical and pressure sensors",
    long_about = "Samples an optical pose source and a pressure pad, calibrates a personal \n\
                  baseline, and scores how long the user keeps a good posture.\n\n\
                  Devices that are missing or failing are replaced by simulated \n\
                  readings, so the pipeline also runs on a machine without sensors."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "POSTURE_SENTINEL_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "POSTURE_SENTINEL_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a monitoring session
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "POSTURE_SENTINEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Force simulated sources for both sensors
    #[arg(long)]
    pub simulate: bool,

    /// Serial device (or capture file) of the pressure pad
    #[arg(long, env = "POSTURE_SENTINEL_SERIAL_PORT")]
    pub serial_port: Option<PathBuf>,

    /// Write the status snapshot to this file
    #[arg(long, env = "POSTURE_SENTINEL_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Seed for the re-check interval generator
    #[arg(long, env = "POSTURE_SENTINEL_SEED")]
    pub seed: Option<u64>,

    /// Session length limit in seconds (0 = until stopped)
    #[arg(long, default_value = "0", env = "POSTURE_SENTINEL_DURATION")]
    pub duration: u64,

    /// Exit as soon as the score reaches zero
    #[arg(long)]
    pub exit_on_finish: bool,

    /// Do not calibrate at startup; wait for a Start/Calibrate command
    #[arg(long)]
    pub no_auto_calibrate: bool,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "POSTURE_SENTINEL_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "posture.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed sensor information
    #[arg(long)]
    pub sensors: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
