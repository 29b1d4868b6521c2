//! Bus and sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::EventCategory;

/// Counters for one bus instance
///
/// Also mirrored into the global `metrics` recorder.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    unrouted: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_published(&self, category: EventCategory) {
        self.published.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_event_published(category);
    }

    pub(crate) fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_delivered(&self, category: EventCategory) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_event_delivered(category);
    }

    pub(crate) fn inc_handler_failures(&self, category: EventCategory, handler: &str) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_handler_failure(category, handler);
    }

    pub(crate) fn inc_unrouted(&self, category: EventCategory) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
        observability::metrics::record_event_unrouted(category);
    }

    /// Events accepted by `publish`
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events taken off the queue by the dispatch loop
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Successful handler invocations
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Handler invocations that returned an error or panicked
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Events dispatched with no subscriber for their category
    pub fn unrouted(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published(),
            dispatched: self.dispatched(),
            delivered: self.delivered(),
            handler_failures: self.handler_failures(),
            unrouted: self.unrouted(),
        }
    }
}

/// Snapshot of bus metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub unrouted: u64,
}

impl BusMetricsSnapshot {
    /// Events published but not yet dispatched
    pub fn pending(&self) -> u64 {
        self.published.saturating_sub(self.dispatched)
    }
}

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Total successful writes
    write_count: AtomicU64,
    /// Total write failures
    failure_count: AtomicU64,
    /// Total events dropped due to full queue
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get total write count
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Increment write count
    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get failure count
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}
