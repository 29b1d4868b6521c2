//! # Ingestion Pipeline
//!
//! Sensor sampling for the posture pipeline.
//!
//! Responsibilities:
//! - Resolve optical and pressure sources from configuration
//! - Poll each source at its fixed rate and publish samples to the bus
//! - Fall back to simulated samples when a device stays unavailable
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::IngestionPipeline;
//!
//! let bus = EventBus::new();
//! let mut pipeline = IngestionPipeline::from_config(&bus, &config.sensors)?;
//! pipeline.start()?;
//! // ...
//! pipeline.stop().await;
//! ```
//!
//! ## Simulated Sources
//!
//! ```ignore
//! use ingestion::SimulatedPressureSource;
//!
//! let mut pad = SimulatedPressureSource::with_seed((500.0, 30.0), (500.0, 30.0), 42)?;
//! let sample = pad.sample();
//! ```

mod device;
mod error;
mod metrics;
mod pipeline;
mod producer;
mod simulated;

// Re-exports
pub use device::{parse_pressure_line, LinePressureSource, UnavailableSource};
pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use pipeline::IngestionPipeline;
pub use producer::{spawn_frame_producer, spawn_pressure_producer, ProducerConfig, ProducerHandle};
pub use simulated::{SimulatedFrameSource, SimulatedPressureSource};
