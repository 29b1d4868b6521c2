//! Ingestion Pipeline main entry

use contracts::{FrameSource, PressureSource, SensorsConfig, SourceMode};
use dispatcher::EventBus;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::device::{LinePressureSource, UnavailableSource};
use crate::error::{IngestionError, Result};
use crate::metrics::MetricsSnapshot;
use crate::producer::{spawn_frame_producer, spawn_pressure_producer, ProducerConfig, ProducerHandle};
use crate::simulated::{SimulatedFrameSource, SimulatedPressureSource};

struct Pending<S> {
    primary: S,
    fallback: Option<S>,
    config: ProducerConfig,
}

/// Ingestion Pipeline
///
/// Owns one optical and one pressure producer. Sources are resolved from
/// configuration up front; tasks are spawned by [`IngestionPipeline::start`].
pub struct IngestionPipeline {
    bus: EventBus,
    cancel: CancellationToken,
    frame: Option<Pending<Box<dyn FrameSource>>>,
    pressure: Option<Pending<Box<dyn PressureSource>>>,
    handles: Vec<ProducerHandle>,
}

impl IngestionPipeline {
    /// Resolve sources for the configured modes
    ///
    /// Hardware mode without a usable device still succeeds: the producer
    /// starts on an unavailable source and falls back to simulation.
    #[instrument(
        name = "ingestion_from_config",
        skip(bus, config),
        fields(optical = ?config.optical.mode, pressure = ?config.pressure.mode)
    )]
    pub fn from_config(bus: &EventBus, config: &SensorsConfig) -> Result<Self> {
        let optical = &config.optical;
        let simulated_frames = SimulatedFrameSource::from_config(optical)?;
        let frame = match optical.mode {
            SourceMode::Simulated => Pending {
                primary: Box::new(simulated_frames) as Box<dyn FrameSource>,
                fallback: None,
                config: ProducerConfig::for_optical(optical)?,
            },
            SourceMode::Hardware => {
                // No pose-estimation driver is linked into this build
                warn!(device_id = optical.device_id, "No optical driver available");
                Pending {
                    primary: Box::new(UnavailableSource::new(format!("camera{}", optical.device_id)))
                        as Box<dyn FrameSource>,
                    fallback: Some(Box::new(simulated_frames) as Box<dyn FrameSource>),
                    config: ProducerConfig::for_optical(optical)?,
                }
            }
        };

        let pad = &config.pressure;
        let simulated_pressure = SimulatedPressureSource::from_config(pad)?;
        let pressure = match pad.mode {
            SourceMode::Simulated => Pending {
                primary: Box::new(simulated_pressure) as Box<dyn PressureSource>,
                fallback: None,
                config: ProducerConfig::for_pressure(pad)?,
            },
            SourceMode::Hardware => Pending {
                primary: open_pressure_device(pad.serial_port.as_deref()),
                fallback: Some(Box::new(simulated_pressure) as Box<dyn PressureSource>),
                config: ProducerConfig::for_pressure(pad)?,
            },
        };

        Ok(Self::with_sources(bus, frame, pressure))
    }

    /// Pipeline over explicit sources (for testing or custom devices)
    pub fn from_sources(
        bus: &EventBus,
        frame: (Box<dyn FrameSource>, Option<Box<dyn FrameSource>>, ProducerConfig),
        pressure: (Box<dyn PressureSource>, Option<Box<dyn PressureSource>>, ProducerConfig),
    ) -> Self {
        Self::with_sources(
            bus,
            Pending {
                primary: frame.0,
                fallback: frame.1,
                config: frame.2,
            },
            Pending {
                primary: pressure.0,
                fallback: pressure.1,
                config: pressure.2,
            },
        )
    }

    fn with_sources(
        bus: &EventBus,
        frame: Pending<Box<dyn FrameSource>>,
        pressure: Pending<Box<dyn PressureSource>>,
    ) -> Self {
        Self {
            bus: bus.clone(),
            cancel: CancellationToken::new(),
            frame: Some(frame),
            pressure: Some(pressure),
            handles: Vec::new(),
        }
    }

    /// Spawn both producers
    ///
    /// # Errors
    /// `AlreadyRunning` if the pipeline was started before.
    #[instrument(name = "ingestion_start", skip(self))]
    pub fn start(&mut self) -> Result<()> {
        let (Some(frame), Some(pressure)) = (self.frame.take(), self.pressure.take()) else {
            return Err(IngestionError::AlreadyRunning {
                name: "ingestion".to_string(),
            });
        };

        self.handles.push(spawn_frame_producer(
            &self.bus,
            frame.primary,
            frame.fallback,
            frame.config,
            self.cancel.child_token(),
        ));
        self.handles.push(spawn_pressure_producer(
            &self.bus,
            pressure.primary,
            pressure.fallback,
            pressure.config,
            self.cancel.child_token(),
        ));
        info!(count = self.handles.len(), "Ingestion producers started");
        Ok(())
    }

    /// Cancel every producer and wait for them to exit
    #[instrument(name = "ingestion_stop", skip(self))]
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.stop().await;
        }
        debug!("Ingestion producers stopped");
    }

    /// Per-producer counters
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Number of running producers
    pub fn producer_count(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn open_pressure_device(serial_port: Option<&str>) -> Box<dyn PressureSource> {
    let Some(path) = serial_port else {
        warn!("No serial port configured for the pressure pad");
        return Box::new(UnavailableSource::new("pressure_pad"));
    };
    match LinePressureSource::open(path) {
        Ok(source) => {
            info!(port = %path, "Pressure pad opened");
            Box::new(source)
        }
        Err(e) => {
            warn!(port = %path, error = %e, "Pressure pad unavailable");
            Box::new(UnavailableSource::new(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OpticalConfig, PressureConfig};
    use std::time::Duration;

    fn fast_config(mode: SourceMode) -> SensorsConfig {
        SensorsConfig {
            optical: OpticalConfig {
                mode,
                rate_hz: 200.0,
                fallback_after: 2,
                ..OpticalConfig::default()
            },
            pressure: PressureConfig {
                mode,
                serial_port: Some("/nonexistent/ttyACM9".to_string()),
                rate_hz: 200.0,
                fallback_after: 2,
                ..PressureConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_simulated_pipeline_publishes_both_streams() {
        let bus = EventBus::new();
        bus.start().await.unwrap();
        let mut pipeline = IngestionPipeline::from_config(&bus, &fast_config(SourceMode::Simulated)).unwrap();
        pipeline.start().unwrap();
        assert_eq!(pipeline.producer_count(), 2);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !pipeline
                .metrics()
                .iter()
                .all(|(_, m)| m.samples_published >= 3)
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        pipeline.stop().await;
        bus.stop().await;
        assert_eq!(pipeline.producer_count(), 0);
        assert!(bus.metrics().published >= 6);
    }

    #[tokio::test]
    async fn test_hardware_without_devices_falls_back() {
        let bus = EventBus::new();
        bus.start().await.unwrap();
        let mut pipeline = IngestionPipeline::from_config(&bus, &fast_config(SourceMode::Hardware)).unwrap();
        pipeline.start().unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !pipeline.metrics().iter().all(|(_, m)| m.fell_back) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        pipeline.stop().await;
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let bus = EventBus::new();
        let mut pipeline = IngestionPipeline::from_config(&bus, &fast_config(SourceMode::Simulated)).unwrap();
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(IngestionError::AlreadyRunning { .. })));
        pipeline.stop().await;
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let bus = EventBus::new();
        let mut config = fast_config(SourceMode::Simulated);
        config.pressure.rate_hz = 0.0;
        let err = IngestionPipeline::from_config(&bus, &config).err().unwrap();
        assert!(matches!(err, IngestionError::InvalidRate { .. }));
    }
}
