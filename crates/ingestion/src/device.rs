//! 设备数据源
//!
//! The pressure pad firmware prints one `foot,cushion` line per reading over
//! its serial link. [`LinePressureSource`] reads that protocol from any
//! buffered reader (a device node, a capture file). Optical hardware has no
//! driver in this build; [`UnavailableSource`] stands in for it so the
//! producer falls back to simulation.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

use contracts::{
    ContractError, FrameSample, FrameSource, PressureSample, PressureSource, SampleOrigin,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};

/// Lines buffered ahead of the producer
const READ_AHEAD: usize = 64;

/// Parse one `foot,cushion` line
///
/// Returns `None` for anything that is not exactly two integers.
pub fn parse_pressure_line(line: &str) -> Option<(i64, i64)> {
    let mut parts = line.trim().split(',');
    let foot = parts.next()?.trim().parse().ok()?;
    let cushion = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((foot, cushion))
}

/// Pressure source speaking the line protocol
///
/// Blocking reads happen on a dedicated reader thread; polling only drains
/// what it has already received, so a silent device reports "nothing
/// available" instead of stalling the caller. The thread exits at EOF, on a
/// read error, or once the source is dropped and its next line is undeliverable.
pub struct LinePressureSource {
    name: String,
    lines: mpsc::Receiver<io::Result<String>>,
}

impl LinePressureSource {
    /// Open a device node or capture file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| IngestionError::DeviceOpen {
            path: PathBuf::from(path),
            source,
        })?;
        Self::new(path.display().to_string(), BufReader::new(file))
    }

    pub fn new<R>(name: impl Into<String>, reader: R) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let name = name.into();
        let (tx, lines) = mpsc::channel(READ_AHEAD);
        thread::Builder::new()
            .name(format!("line-reader-{name}"))
            .spawn({
                let name = name.clone();
                move || read_lines(&name, reader, tx)
            })
            .map_err(|source| IngestionError::ReaderSpawn {
                source_name: name.clone(),
                source,
            })?;
        Ok(Self { name, lines })
    }
}

fn read_lines<R: BufRead>(name: &str, mut reader: R, tx: mpsc::Sender<io::Result<String>>) {
    loop {
        let mut line = String::new();
        let next = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => Ok(line),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = next.is_err();
        if tx.blocking_send(next).is_err() || failed {
            break;
        }
    }
    trace!(source = %name, "Line reader finished");
}

impl PressureSource for LinePressureSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Hardware
    }

    fn poll_pressure(&mut self) -> std::result::Result<Option<PressureSample>, ContractError> {
        let line = match self.lines.try_recv() {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => return Err(ContractError::sensor_read(&self.name, e.to_string())),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(None),
        };
        match parse_pressure_line(&line) {
            Some((foot, cushion)) => Ok(Some(PressureSample::new(
                foot,
                cushion,
                SampleOrigin::Hardware,
            ))),
            None => {
                debug!(source = %self.name, line = %line.trim(), "Malformed pressure line");
                Err(ContractError::sensor_read(
                    &self.name,
                    format!("malformed line '{}'", line.trim()),
                ))
            }
        }
    }
}

/// Source with no device behind it
///
/// Every poll reports "nothing available".
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    name: String,
}

impl UnavailableSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl FrameSource for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Hardware
    }

    fn poll_frame(&mut self) -> std::result::Result<Option<FrameSample>, ContractError> {
        Ok(None)
    }
}

impl PressureSource for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> SampleOrigin {
        SampleOrigin::Hardware
    }

    fn poll_pressure(&mut self) -> std::result::Result<Option<PressureSample>, ContractError> {
        Ok(None)
    }
}
