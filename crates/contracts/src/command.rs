//! Commands and system notices
//!
//! Control-plane payloads exchanged between the presentation layer and the
//! orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Calibrate,
}

/// Lifecycle command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub timestamp: DateTime<Utc>,
    pub kind: CommandKind,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            params: HashMap::new(),
        }
    }
}

/// System-level notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum SystemNotice {
    /// Calibration capture has begun
    CalibrationStarted,

    /// Score reached zero; the run is over
    SessionFinished { score: u8, elapsed_seconds: f64 },

    /// A producer switched to simulated samples
    SourceDegraded {
        source: String,
        consecutive_failures: u32,
    },

    /// Orchestrator is shutting down
    ShuttingDown,
}
