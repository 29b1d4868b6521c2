//! SinkHandle - manages a sink with isolated queue and worker task
//!
//! Sinks reach the bus through a [`SinkFeeder`]: delivery is a non-blocking
//! `try_send`, so a slow sink never stalls the dispatch loop.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{Event, EventSink};

use crate::handler::{EventHandler, HandlerFuture};
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send events to worker
    tx: mpsc::Sender<Event>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: EventSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Send an event to the sink (non-blocking)
    ///
    /// Returns true if sent, false if queue full (event dropped)
    pub fn try_send(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    category = %e.category(),
                    "Queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued events are written before the sink is flushed and closed.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Subscriber adapter feeding a sink's queue
///
/// Holds a weak sender, so a live subscription never keeps the worker from
/// observing shutdown.
pub struct SinkFeeder {
    name: String,
    tx: mpsc::WeakSender<Event>,
    metrics: Arc<SinkMetrics>,
}

impl SinkHandle {
    /// Create a bus subscriber that forwards events to this sink
    pub fn feeder(&self) -> SinkFeeder {
        SinkFeeder {
            name: self.name.clone(),
            tx: self.tx.downgrade(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl EventHandler for SinkFeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, event: &'a Event) -> HandlerFuture<'a> {
        Box::pin(async move {
            let Some(tx) = self.tx.upgrade() else {
                debug!(sink = %self.name, "Sink already shut down, event ignored");
                return Ok(());
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    category = %event.category(),
                    "Queue full, event dropped"
                );
            }
            Ok(())
        })
    }
}

/// Worker task that consumes events and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: EventSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Event>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(event) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => {
                metrics.inc_write_count();
                observability::metrics::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::metrics::record_sink_write(&name, false);
                error!(
                    sink = %name,
                    category = %event.category(),
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, SystemNotice};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl MockSink {
        fn new(name: &str, write_count: Arc<AtomicU64>) -> Self {
            Self {
                name: name.to_string(),
                write_count,
                should_fail: false,
                delay_ms: 0,
            }
        }
    }

    impl EventSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _event: &Event) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn notice() -> Event {
        SystemNotice::CalibrationStarted.into()
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(MockSink::new("test", Arc::clone(&write_count)), 10);

        for _ in 0..5 {
            assert!(handle.try_send(notice()));
        }

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full() {
        let mut sink = MockSink::new("slow", Arc::new(AtomicU64::new(0)));
        sink.delay_ms = 100;

        let handle = SinkHandle::spawn(sink, 2);
        for _ in 0..10 {
            handle.try_send(notice());
        }

        assert!(handle.metrics().dropped_count() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let mut sink = MockSink::new("failing", Arc::new(AtomicU64::new(0)));
        sink.should_fail = true;

        let handle = SinkHandle::spawn(sink, 10);
        for _ in 0..3 {
            handle.try_send(notice());
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failure_count(), 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_feeder_never_fails_the_bus() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(MockSink::new("fed", Arc::clone(&write_count)), 10);
        let feeder = handle.feeder();

        let event = notice();
        assert!(feeder.handle(&event).await.is_ok());
        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 1);

        // Worker gone: still Ok
        assert!(feeder.handle(&event).await.is_ok());
    }
}
