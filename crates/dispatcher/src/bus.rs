//! EventBus - asynchronous publish/subscribe distribution
//!
//! Producers enqueue into an unbounded queue and never wait on subscribers.
//! A single dispatch loop pulls one event at a time and fans it out to the
//! subscribers of its category, awaiting each one before the next.
//!
//! Stop policy: the loop observes the stop signal only between events, so an
//! in-flight fan-out always completes. Events still queued stay queued and
//! are delivered after the next `start()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{Event, EventCategory};

use crate::error::{BusError, HandlerError};
use crate::handler::EventHandler;
use crate::metrics::{BusMetrics, BusMetricsSnapshot};
use crate::registry::{Subscriber, SubscriberRegistry, Subscription};

const IDLE_POLL: Duration = Duration::from_millis(2);

/// Handle to a bus instance
///
/// Cheap to clone; all clones share the same queue, registry and loop.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    tx: mpsc::UnboundedSender<Event>,
    state: Mutex<LoopState>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<BusMetrics>,
}

enum LoopState {
    /// Not running; the queue receiver is parked here
    Idle(mpsc::UnboundedReceiver<Event>),
    Running {
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<mpsc::UnboundedReceiver<Event>>,
    },
    /// The loop died and took the receiver with it
    Lost,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a stopped bus
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BusInner {
                tx,
                state: Mutex::new(LoopState::Idle(rx)),
                registry: Arc::new(SubscriberRegistry::default()),
                metrics: Arc::new(BusMetrics::new()),
            }),
        }
    }

    /// Enqueue an event
    ///
    /// Never blocks. Returns once enqueued, not once delivered. Events
    /// published while the loop is stopped wait in the queue.
    pub fn publish(&self, event: impl Into<Event>) -> Result<(), BusError> {
        let event = event.into();
        let category = event.category();
        self.inner.tx.send(event).map_err(|_| BusError::Closed)?;
        self.inner.metrics.inc_published(category);
        trace!(category = %category, "Event published");
        Ok(())
    }

    /// Register a handler for one category
    pub fn subscribe<H: EventHandler>(&self, category: EventCategory, handler: H) -> Subscription {
        self.subscribe_shared(category, Arc::new(handler))
    }

    /// Register an already shared handler (e.g. one handler on several categories)
    pub fn subscribe_shared(
        &self,
        category: EventCategory,
        handler: Arc<dyn EventHandler>,
    ) -> Subscription {
        let name = handler.name().to_string();
        let id = self.inner.registry.insert(category, handler);
        debug!(handler = %name, category = %category, id, "Subscribed");
        Subscription::new(id, category, name, Arc::downgrade(&self.inner.registry))
    }

    /// Number of handlers currently registered for a category
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.inner.registry.count(category)
    }

    /// Bus counters
    pub fn metrics(&self) -> BusMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Wait until every published event has been dispatched
    ///
    /// Returns false if the queue did not empty within `timeout` (for
    /// example because the loop is stopped). Events published concurrently
    /// may keep the queue busy.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            while self.inner.metrics.snapshot().pending() > 0 {
                tokio::time::sleep(IDLE_POLL).await;
            }
        })
        .await
        .is_ok();
        if !drained {
            debug!(
                pending = self.inner.metrics.snapshot().pending(),
                "Event bus still busy"
            );
        }
        drained
    }

    /// Whether the dispatch loop is running
    pub async fn is_running(&self) -> bool {
        matches!(*self.inner.state.lock().await, LoopState::Running { .. })
    }

    /// Start the dispatch loop
    ///
    /// Idempotent: starting a running bus is a no-op.
    ///
    /// # Errors
    /// `BusError::Closed` if a previous loop terminated abnormally.
    #[instrument(name = "event_bus_start", skip(self))]
    pub async fn start(&self) -> Result<(), BusError> {
        let mut state = self.inner.state.lock().await;
        match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Idle(rx) => {
                let queued = rx.len();
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let task = tokio::spawn(dispatch_loop(
                    rx,
                    shutdown_rx,
                    Arc::clone(&self.inner.registry),
                    Arc::clone(&self.inner.metrics),
                ));
                *state = LoopState::Running {
                    shutdown: shutdown_tx,
                    task,
                };
                info!(queued, "Event bus started");
                Ok(())
            }
            running @ LoopState::Running { .. } => {
                *state = running;
                debug!("Event bus already running");
                Ok(())
            }
            LoopState::Lost => Err(BusError::Closed),
        }
    }

    /// Stop the dispatch loop and wait for it to finish
    ///
    /// Idempotent: stopping a stopped bus is a no-op. Must not be awaited
    /// from inside a handler, since the loop waits for that handler.
    #[instrument(name = "event_bus_stop", skip(self))]
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        match std::mem::replace(&mut *state, LoopState::Lost) {
            LoopState::Running { shutdown, task } => {
                // The loop may already have exited on its own
                let _ = shutdown.send(());
                match task.await {
                    Ok(rx) => {
                        let pending = rx.len();
                        observability::metrics::record_bus_pending(pending);
                        if pending > 0 {
                            warn!(pending, "Event bus stopped with queued events");
                        }
                        *state = LoopState::Idle(rx);
                        info!("Event bus stopped");
                    }
                    Err(e) => {
                        error!(error = %e, "Dispatch loop terminated abnormally");
                    }
                }
            }
            other => {
                *state = other;
                debug!("Event bus not running, stop ignored");
            }
        }
    }
}

/// Dispatch loop body
///
/// Returns the receiver so a later `start()` can resume the queue.
async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Event>,
    mut shutdown: oneshot::Receiver<()>,
    registry: Arc<SubscriberRegistry>,
    metrics: Arc<BusMetrics>,
) -> mpsc::UnboundedReceiver<Event> {
    debug!("Dispatch loop started");
    let mut dispatched: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = rx.recv() => match next {
                Some(event) => {
                    dispatch(&registry, &metrics, event).await;
                    metrics.inc_dispatched();
                    dispatched += 1;
                    if dispatched % 1000 == 0 {
                        debug!(events = dispatched, "Dispatch progress");
                    }
                }
                None => break,
            },
        }
    }

    debug!(events = dispatched, "Dispatch loop exited");
    rx
}

/// Fan one event out to the current subscribers of its category
async fn dispatch(registry: &SubscriberRegistry, metrics: &BusMetrics, event: Event) {
    let category = event.category();
    let subscribers = registry.snapshot(category);
    if subscribers.is_empty() {
        metrics.inc_unrouted(category);
        trace!(category = %category, "No subscribers");
        return;
    }

    let event = Arc::new(event);
    for subscriber in subscribers {
        if !subscriber.is_active() {
            continue;
        }
        match invoke(&subscriber, Arc::clone(&event)).await {
            Ok(()) => metrics.inc_delivered(category),
            Err(e) => {
                metrics.inc_handler_failures(category, subscriber.name());
                warn!(
                    handler = %subscriber.name(),
                    subscriber_id = subscriber.id(),
                    category = %category,
                    error = %e,
                    "Handler failed, continuing"
                );
            }
        }
    }
}

/// Run one handler on its own task so a panic is contained
async fn invoke(subscriber: &Subscriber, event: Arc<Event>) -> Result<(), HandlerError> {
    let handler = Arc::clone(subscriber.handler());
    let outcome = tokio::spawn(async move { handler.handle(&event).await }).await;
    match outcome {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::new(subscriber.name(), "handler panicked")),
        Err(_) => Err(HandlerError::new(subscriber.name(), "handler cancelled")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use contracts::{Command, CommandKind, EventPayload, FrameSample, SystemNotice};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    type Log = Arc<StdMutex<Vec<u64>>>;

    fn frame(id: u64) -> FrameSample {
        FrameSample::new(id, Some(0.05), Some(0.05))
    }

    fn frame_recorder(name: &str, log: Log) -> impl EventHandler {
        handler_fn(name.to_string(), move |event: Event| {
            let log = Arc::clone(&log);
            async move {
                if let EventPayload::Frame(f) = event.payload() {
                    log.lock().unwrap().push(f.frame_sequence_id);
                }
                Ok(())
            }
        })
    }

    async fn wait_for(bus: &EventBus, attempts: u64) {
        timeout(Duration::from_secs(2), async {
            while bus.metrics().delivered + bus.metrics().handler_failures + bus.metrics().unrouted
                < attempts
            {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatch did not settle");
    }

    #[tokio::test]
    async fn test_fan_out_to_two_handlers_in_publish_order() {
        let bus = EventBus::new();
        let a: Log = Arc::default();
        let b: Log = Arc::default();
        let _sa = bus.subscribe(EventCategory::Frame, frame_recorder("a", Arc::clone(&a)));
        let _sb = bus.subscribe(EventCategory::Frame, frame_recorder("b", Arc::clone(&b)));
        bus.start().await.unwrap();

        for id in 0..5 {
            bus.publish(frame(id)).unwrap();
        }
        wait_for(&bus, 10).await;

        assert_eq!(*a.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*b.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_only_that_handler() {
        let bus = EventBus::new();
        let a: Log = Arc::default();
        let b: Log = Arc::default();
        let sa = bus.subscribe(EventCategory::Frame, frame_recorder("a", Arc::clone(&a)));
        let _sb = bus.subscribe(EventCategory::Frame, frame_recorder("b", Arc::clone(&b)));
        bus.start().await.unwrap();

        bus.publish(frame(1)).unwrap();
        wait_for(&bus, 2).await;

        assert!(sa.unsubscribe());
        assert_eq!(bus.subscriber_count(EventCategory::Frame), 1);

        bus.publish(frame(2)).unwrap();
        wait_for(&bus, 3).await;

        assert_eq!(*a.lock().unwrap(), vec![1]);
        assert_eq!(*b.lock().unwrap(), vec![1, 2]);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let _f = bus.subscribe(
            EventCategory::Frame,
            handler_fn("fails", |_event: Event| async {
                Err(HandlerError::new("fails", "boom"))
            }),
        );
        let _p = bus.subscribe(
            EventCategory::Frame,
            handler_fn("panics", |event: Event| async move {
                if event.category() == EventCategory::Frame {
                    panic!("handler exploded");
                }
                Ok(())
            }),
        );
        let _ok = bus.subscribe(EventCategory::Frame, frame_recorder("ok", Arc::clone(&log)));
        bus.start().await.unwrap();

        bus.publish(frame(1)).unwrap();
        bus.publish(frame(2)).unwrap();
        wait_for(&bus, 6).await;

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        let metrics = bus.metrics();
        assert_eq!(metrics.handler_failures, 4);
        assert_eq!(metrics.delivered, 2);
        assert!(bus.is_running().await);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_async_handlers_are_serialized() {
        let bus = EventBus::new();
        let order: Arc<StdMutex<Vec<String>>> = Arc::default();
        let slow_order = Arc::clone(&order);
        let _slow = bus.subscribe(
            EventCategory::Frame,
            handler_fn("slow", move |event: Event| {
                let order = Arc::clone(&slow_order);
                async move {
                    let EventPayload::Frame(f) = event.payload() else {
                        return Ok(());
                    };
                    let id = f.frame_sequence_id;
                    order.lock().unwrap().push(format!("start-{id}"));
                    sleep(Duration::from_millis(20)).await;
                    order.lock().unwrap().push(format!("end-{id}"));
                    Ok(())
                }
            }),
        );
        bus.start().await.unwrap();

        bus.publish(frame(1)).unwrap();
        bus.publish(frame(2)).unwrap();
        wait_for(&bus, 2).await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["start-1", "end-1", "start-2", "end-2"]
        );
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::default();
        let seen: Log = Arc::default();

        let handler_slot = Arc::clone(&slot);
        let handler_seen = Arc::clone(&seen);
        let sub = bus.subscribe(
            EventCategory::Frame,
            handler_fn("once", move |_event: Event| {
                let slot = Arc::clone(&handler_slot);
                let seen = Arc::clone(&handler_seen);
                async move {
                    seen.lock().unwrap().push(1);
                    if let Some(sub) = slot.lock().unwrap().take() {
                        sub.unsubscribe();
                    }
                    Ok(())
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);
        bus.start().await.unwrap();

        bus.publish(frame(1)).unwrap();
        bus.publish(frame(2)).unwrap();
        wait_for(&bus, 2).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.metrics().unrouted, 1);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_noop() {
        let bus = EventBus::new();
        bus.stop().await;
        bus.stop().await;
        assert!(!bus.is_running().await);

        bus.start().await.unwrap();
        bus.start().await.unwrap();
        assert!(bus.is_running().await);
        bus.stop().await;
        bus.stop().await;
        assert!(!bus.is_running().await);
    }

    #[tokio::test]
    async fn test_queued_events_survive_restart() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let _s = bus.subscribe(EventCategory::Frame, frame_recorder("r", Arc::clone(&log)));

        // Published while stopped
        bus.publish(frame(7)).unwrap();
        bus.publish(SystemNotice::ShuttingDown).unwrap();
        assert!(log.lock().unwrap().is_empty());

        bus.start().await.unwrap();
        wait_for(&bus, 2).await;
        assert_eq!(*log.lock().unwrap(), vec![7]);

        bus.stop().await;
        bus.publish(frame(8)).unwrap();
        bus.start().await.unwrap();
        wait_for(&bus, 3).await;
        assert_eq!(*log.lock().unwrap(), vec![7, 8]);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_wait_idle_reports_drained_queue() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let _s = bus.subscribe(EventCategory::Frame, frame_recorder("r", Arc::clone(&log)));
        for id in 0..20 {
            bus.publish(frame(id)).unwrap();
        }

        // Loop not running: nothing drains
        assert!(!bus.wait_idle(Duration::from_millis(20)).await);
        assert_eq!(bus.metrics().pending(), 20);

        bus.start().await.unwrap();
        assert!(bus.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(log.lock().unwrap().len(), 20);
        assert_eq!(bus.metrics().dispatched, 20);
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_categories_are_routed_separately() {
        let bus = EventBus::new();
        let commands: Arc<StdMutex<Vec<CommandKind>>> = Arc::default();
        let sink = Arc::clone(&commands);
        let _c = bus.subscribe(
            EventCategory::Command,
            handler_fn("commands", move |event: Event| {
                let sink = Arc::clone(&sink);
                async move {
                    if let EventPayload::Command(cmd) = event.into_payload() {
                        sink.lock().unwrap().push(cmd.kind);
                    }
                    Ok(())
                }
            }),
        );
        bus.start().await.unwrap();

        bus.publish(frame(1)).unwrap();
        bus.publish(Command::new(CommandKind::Restart)).unwrap();
        wait_for(&bus, 2).await;

        assert_eq!(*commands.lock().unwrap(), vec![CommandKind::Restart]);
        assert_eq!(bus.metrics().published, 2);
        bus.stop().await;
    }
}
