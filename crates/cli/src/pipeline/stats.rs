//! Session statistics.

use std::fmt;
use std::time::Duration;

use dispatcher::BusMetricsSnapshot;
use observability::SessionSummary;

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Ctrl+C / SIGTERM
    #[default]
    Signal,
    /// A `Stop` command was published
    Command,
    /// The configured duration elapsed
    Timeout,
    /// Score reached zero with `--exit-on-finish`
    Finished,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Signal => "signal",
            StopReason::Command => "stop command",
            StopReason::Timeout => "duration elapsed",
            StopReason::Finished => "session finished",
        })
    }
}

/// Statistics from a monitoring session
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total wall time of the session
    pub duration: Duration,

    /// Why the session ended
    pub stop_reason: StopReason,

    /// Completed calibrations
    pub calibrations: u64,

    /// Whether the score reached zero
    pub finished: bool,

    /// Evaluator aggregate
    pub session: SessionSummary,

    /// Bus counters at shutdown
    pub bus: BusMetricsSnapshot,

    /// Samples published per producer
    pub producers: Vec<(String, u64, bool)>,

    /// Writes/drops per sink
    pub sinks: Vec<(String, u64, u64)>,
}

impl PipelineStats {
    /// Evaluations per minute
    pub fn evaluation_rate(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.session.total_evaluations as f64 / minutes
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n+--------------------------------------------------------------+");
        println!("|                    Posture Sentinel Session                  |");
        println!("+--------------------------------------------------------------+\n");

        println!("Overview");
        println!("   |- Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   |- Stopped by: {}", self.stop_reason);
        println!("   |- Calibrations: {}", self.calibrations);
        println!("   |- Finished: {}", if self.finished { "yes" } else { "no" });
        println!("   `- Evaluations/min: {:.2}", self.evaluation_rate());

        println!("\nEvent Bus");
        println!("   |- Published: {}", self.bus.published);
        println!("   |- Deliveries: {}", self.bus.delivered);
        println!("   |- Handler failures: {}", self.bus.handler_failures);
        println!("   `- Still queued: {}", self.bus.pending());

        if !self.producers.is_empty() {
            println!("\nProducers");
            for (name, published, fell_back) in &self.producers {
                let note = if *fell_back { " (simulated fallback)" } else { "" };
                println!("   |- {name}: {published} samples{note}");
            }
        }

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (name, writes, dropped) in &self.sinks {
                println!("   |- {name}: {writes} writes, {dropped} dropped");
            }
        }

        println!("\n{}", self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_rate() {
        let stats = PipelineStats {
            duration: Duration::from_secs(120),
            session: SessionSummary {
                total_evaluations: 30,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((stats.evaluation_rate() - 15.0).abs() < 1e-9);
        assert_eq!(PipelineStats::default().evaluation_rate(), 0.0);
    }
}
