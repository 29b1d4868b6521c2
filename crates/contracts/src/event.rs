//! Event - the unit carried by the distribution bus
//!
//! The category is derived from the payload variant, so an event can never
//! carry a payload that disagrees with its category.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CalibrationBaseline, Command, FrameSample, PostureResult, PressureSample, SystemNotice};

/// Event category used for subscription routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Frame,
    Pressure,
    PostureResult,
    Calibration,
    Command,
    System,
}

impl EventCategory {
    /// All categories
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Frame,
        EventCategory::Pressure,
        EventCategory::PostureResult,
        EventCategory::Calibration,
        EventCategory::Command,
        EventCategory::System,
    ];

    /// Stable name used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Frame => "frame",
            EventCategory::Pressure => "pressure",
            EventCategory::PostureResult => "posture_result",
            EventCategory::Calibration => "calibration",
            EventCategory::Command => "command",
            EventCategory::System => "system",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Frame(FrameSample),
    Pressure(PressureSample),
    PostureResult(PostureResult),
    Calibration(CalibrationBaseline),
    Command(Command),
    System(SystemNotice),
}

/// Immutable bus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    payload: EventPayload,
}

impl Event {
    /// Wrap a payload
    pub fn new(payload: EventPayload) -> Self {
        Self { payload }
    }

    /// Routing category
    pub fn category(&self) -> EventCategory {
        match &self.payload {
            EventPayload::Frame(_) => EventCategory::Frame,
            EventPayload::Pressure(_) => EventCategory::Pressure,
            EventPayload::PostureResult(_) => EventCategory::PostureResult,
            EventPayload::Calibration(_) => EventCategory::Calibration,
            EventPayload::Command(_) => EventCategory::Command,
            EventPayload::System(_) => EventCategory::System,
        }
    }

    /// Borrow the payload
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Take the payload
    pub fn into_payload(self) -> EventPayload {
        self.payload
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

macro_rules! impl_from_payload {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Event {
                fn from(value: $ty) -> Self {
                    Self::new(EventPayload::$variant(value))
                }
            }
        )*
    };
}

impl_from_payload!(
    FrameSample => Frame,
    PressureSample => Pressure,
    PostureResult => PostureResult,
    CalibrationBaseline => Calibration,
    Command => Command,
    SystemNotice => System,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandKind, SampleOrigin};

    #[test]
    fn test_category_follows_payload() {
        let event: Event = PressureSample::new(500, 500, SampleOrigin::Simulated).into();
        assert_eq!(event.category(), EventCategory::Pressure);

        let event: Event = Command::new(CommandKind::Restart).into();
        assert_eq!(event.category(), EventCategory::Command);

        let event: Event = SystemNotice::ShuttingDown.into();
        assert_eq!(event.category(), EventCategory::System);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event: Event = CalibrationBaseline::new(500.0, 480.0, 1.0).into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "calibration");
        assert_eq!(json["data"]["baseline_cushion"], 480.0);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.category(), EventCategory::Calibration);
    }
}
