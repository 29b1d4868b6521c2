//! LogSink - structured alert log via tracing

use contracts::{
    CalibrationBaseline, ContractError, Event, EventPayload, EventSink, PostureResult,
    SystemNotice,
};
use tracing::{debug, info, instrument, warn};

/// Sink that logs posture results and lifecycle notices
pub struct LogSink {
    name: String,
    results: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: 0,
        }
    }

    fn log_result(&mut self, result: &PostureResult) {
        self.results += 1;
        if result.alert {
            warn!(
                sink = %self.name,
                status = %result.status,
                score = result.score,
                elapsed_s = result.elapsed_seconds,
                "{}",
                result.status.message()
            );
        } else if result.status.is_bad() {
            debug!(
                sink = %self.name,
                status = %result.status,
                score = result.score,
                cooldown = result.cooldown_active,
                "Bad posture, no penalty"
            );
        } else {
            info!(
                sink = %self.name,
                status = %result.status,
                score = result.score,
                elapsed_s = result.elapsed_seconds,
                "{}",
                result.status.message()
            );
        }
    }

    fn log_calibration(&self, baseline: &CalibrationBaseline) {
        info!(
            sink = %self.name,
            foot = ?baseline.baseline_foot,
            cushion = ?baseline.baseline_cushion,
            eye_ratio = ?baseline.baseline_eye_ratio,
            completed = baseline.completed,
            "Calibration complete"
        );
        let invalid = baseline.invalid_channels();
        if !invalid.is_empty() {
            warn!(sink = %self.name, channels = ?invalid, "Channels without a usable baseline will be skipped");
        }
    }

    fn log_notice(&self, notice: &SystemNotice) {
        match notice {
            SystemNotice::CalibrationStarted => {
                info!(sink = %self.name, "Calibrating, hold a good posture");
            }
            SystemNotice::SessionFinished {
                score,
                elapsed_seconds,
            } => {
                warn!(sink = %self.name, score, elapsed_s = elapsed_seconds, "Session finished");
            }
            SystemNotice::SourceDegraded {
                source,
                consecutive_failures,
            } => {
                warn!(
                    sink = %self.name,
                    source = %source,
                    consecutive_failures,
                    "Source switched to simulated samples"
                );
            }
            SystemNotice::ShuttingDown => {
                info!(sink = %self.name, "Shutting down");
            }
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, category = %event.category())
    )]
    async fn write(&mut self, event: &Event) -> Result<(), ContractError> {
        match event.payload() {
            EventPayload::PostureResult(result) => self.log_result(result),
            EventPayload::Calibration(baseline) => self.log_calibration(baseline),
            EventPayload::System(notice) => self.log_notice(notice),
            EventPayload::Command(command) => {
                info!(sink = %self.name, kind = ?command.kind, "Command received");
            }
            EventPayload::Frame(_) | EventPayload::Pressure(_) => {}
        }
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, results = self.results, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::PostureStatus;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_log_sink_counts_results() {
        let mut sink = LogSink::new("test_log");
        let result = PostureResult {
            timestamp: Utc::now(),
            status: PostureStatus::BadFoot,
            score: 9,
            elapsed_seconds: 3.0,
            details: BTreeMap::new(),
            alert: true,
            cooldown_active: false,
        };

        assert!(sink.write(&result.into()).await.is_ok());
        assert!(sink.write(&SystemNotice::ShuttingDown.into()).await.is_ok());
        assert_eq!(sink.results, 1);
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
