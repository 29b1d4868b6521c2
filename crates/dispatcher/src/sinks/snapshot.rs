//! SnapshotSink - shared status file for out-of-process readers
//!
//! Every state change rewrites the whole snapshot into `<path>.tmp`, syncs it
//! and renames it over `<path>`. A polling reader therefore sees either the
//! previous or the new document, never a partial one.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use contracts::{
    CommandKind, ContractError, Event, EventPayload, EventSink, PostureStatus, SystemNotice,
    MAX_SCORE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Status document written by [`SnapshotSink`]
///
/// Stable JSON contract: snake_case status strings, RFC 3339 times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub score: u8,
    pub status: PostureStatus,
    pub message: String,
    pub details: BTreeMap<String, f64>,
    pub calibration_complete: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            score: MAX_SCORE,
            status: PostureStatus::Unknown,
            message: "Waiting for calibration".to_string(),
            details: BTreeMap::new(),
            calibration_complete: false,
            start_time: None,
            finished: false,
            updated_at: Utc::now(),
        }
    }
}

impl StatusSnapshot {
    /// Read a snapshot file
    pub fn read_from(path: &Path) -> Result<Self, ContractError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ContractError::Other(format!("invalid status snapshot: {e}")))
    }

    /// Apply one event; returns whether anything changed
    fn apply(&mut self, event: &Event) -> bool {
        match event.payload() {
            EventPayload::PostureResult(result) => {
                self.score = result.score;
                self.status = result.status;
                self.message = result.status.message().to_string();
                self.details = result.details.clone();
            }
            EventPayload::Calibration(baseline) if baseline.completed => {
                *self = Self {
                    calibration_complete: true,
                    start_time: Some(baseline.timestamp),
                    message: "Calibration complete, monitoring".to_string(),
                    ..Self::default()
                };
            }
            EventPayload::System(SystemNotice::CalibrationStarted) => {
                *self = Self {
                    message: "Calibrating, hold a good posture".to_string(),
                    ..Self::default()
                };
            }
            EventPayload::System(SystemNotice::SessionFinished { score, .. }) => {
                self.score = *score;
                self.finished = true;
                self.message = "Session finished".to_string();
            }
            EventPayload::Command(command) if command.kind == CommandKind::Restart => {
                *self = Self::default();
            }
            _ => return false,
        }
        self.updated_at = Utc::now();
        true
    }
}

/// Sink that maintains the status snapshot file
pub struct SnapshotSink {
    name: String,
    path: PathBuf,
    tmp_path: PathBuf,
    snapshot: StatusSnapshot,
}

impl SnapshotSink {
    /// Create a new SnapshotSink and write the initial document
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");

        let sink = Self {
            name: name.into(),
            tmp_path: PathBuf::from(tmp_name),
            path,
            snapshot: StatusSnapshot::default(),
        };
        sink.persist()?;
        Ok(sink)
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let path = params.get("path").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' param")
        })?;
        Self::new(name, path)
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = File::create(&self.tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&self.tmp_path, &self.path)
    }
}

impl EventSink for SnapshotSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "snapshot_sink_write",
        skip(self, event),
        fields(sink = %self.name, category = %event.category())
    )]
    async fn write(&mut self, event: &Event) -> Result<(), ContractError> {
        if !self.snapshot.apply(event) {
            return Ok(());
        }
        self.persist()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(
            sink = %self.name,
            score = self.snapshot.score,
            status = %self.snapshot.status,
            "Snapshot updated"
        );
        Ok(())
    }

    #[instrument(name = "snapshot_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Every write is already durable
        Ok(())
    }

    #[instrument(name = "snapshot_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, path = %self.path.display(), "SnapshotSink closed");
        Ok(())
    }
}
