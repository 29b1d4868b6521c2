//! Sink implementations
//!
//! Contains LogSink and SnapshotSink.

mod log;
mod snapshot;

pub use self::log::LogSink;
pub use self::snapshot::{SnapshotSink, StatusSnapshot};
