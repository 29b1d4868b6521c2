//! Producer metrics

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Per-producer counters
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Samples published to the bus
    pub samples_published: AtomicU64,

    /// Polls that yielded nothing
    pub polls_unavailable: AtomicU64,

    /// Polls that failed with an error
    pub read_errors: AtomicU64,

    /// Whether the producer switched to its simulated stand-in
    pub fell_back: AtomicBool,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.samples_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable(&self) {
        self.polls_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fell_back.store(true, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_published: self.samples_published.load(Ordering::Relaxed),
            polls_unavailable: self.polls_unavailable.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            fell_back: self.fell_back.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub samples_published: u64,
    pub polls_unavailable: u64,
    pub read_errors: u64,
    pub fell_back: bool,
}
