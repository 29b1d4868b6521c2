//! Dispatcher - attaches presentation sinks to the bus
//!
//! Each sink runs behind its own [`SinkHandle`] and is subscribed to the
//! presentation categories through a non-blocking feeder.

use std::sync::Arc;

use tracing::{info, instrument};

use contracts::{EventCategory, SinkConfig, SinkType};

use crate::bus::EventBus;
use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::registry::Subscription;
use crate::sinks::{LogSink, SnapshotSink};

/// Categories forwarded to presentation sinks
pub const PRESENTATION_CATEGORIES: [EventCategory; 4] = [
    EventCategory::PostureResult,
    EventCategory::Calibration,
    EventCategory::Command,
    EventCategory::System,
];

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    bus: EventBus,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, bus: EventBus) -> Self {
        Self { config, bus }
    }

    /// Build the sinks and subscribe them to the bus
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Vec::with_capacity(self.config.sinks.len());
        for sink_config in &self.config.sinks {
            handles.push(create_sink_handle(sink_config)?);
        }
        Ok(Dispatcher::attach(&self.bus, handles))
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Snapshot => {
            let sink = SnapshotSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Running set of sinks attached to a bus
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    subscriptions: Vec<Subscription>,
}

impl Dispatcher {
    /// Subscribe already spawned handles (for testing or custom sinks)
    pub fn attach(bus: &EventBus, handles: Vec<SinkHandle>) -> Self {
        let mut subscriptions = Vec::with_capacity(handles.len() * PRESENTATION_CATEGORIES.len());
        for handle in &handles {
            let feeder = Arc::new(handle.feeder());
            for category in PRESENTATION_CATEGORIES {
                subscriptions.push(bus.subscribe_shared(category, feeder.clone()));
            }
        }
        info!(sinks = handles.len(), "Dispatcher attached");
        Self {
            handles,
            subscriptions,
        }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Detach from the bus, then drain and close every sink
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

/// Convenience function to create a dispatcher from sink configs
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    bus: &EventBus,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, bus.clone()).build()
}
