//! # Dispatcher
//!
//! Event distribution module.
//!
//! Responsibilities:
//! - Asynchronous publish/subscribe bus with a single dispatch loop
//! - Failure isolation between subscribers
//! - Fan-out of presentation events to isolated sinks, never blocking the bus

pub mod bus;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod sinks;

pub use bus::EventBus;
pub use contracts::{Event, EventCategory, EventSink};
pub use dispatcher::{
    create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig, PRESENTATION_CATEGORIES,
};
pub use error::{BusError, DispatcherError, HandlerError};
pub use handle::{SinkFeeder, SinkHandle};
pub use handler::{handler_fn, EventHandler, FnHandler, HandlerFuture};
pub use metrics::{BusMetrics, BusMetricsSnapshot, MetricsSnapshot, SinkMetrics};
pub use registry::{SubscriberId, Subscription};
pub use sinks::{LogSink, SnapshotSink, StatusSnapshot};
