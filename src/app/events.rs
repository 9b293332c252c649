//! Outbound gateway events.
//!
//! The clock task emits these into the event queue; the BLE loop drains
//! them and sends each as a notification of the shape
//! `{"type": <kind>, "timestamp": <ms>, "data": {…}}`.
//!
//! Priority-0 events (discrete buttons, errors, initial subscription
//! status) are head-inserted into the event queue so a burst of time
//! updates cannot delay them.

use serde_json::{Map, Value, json};

/// Priority value for head-inserted events.
pub const PRIORITY_HIGH: u8 = 0;
/// Priority value for tail-appended events.
pub const PRIORITY_NORMAL: u8 = 1;

/// Discriminant of a [`ClockEvent`]; the wire `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TimeUpdate,
    ButtonEvent,
    ConnectionStatus,
    Error,
    SystemStatus,
}

impl EventKind {
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::TimeUpdate => "timeUpdate",
            Self::ButtonEvent => "buttonEvent",
            Self::ConnectionStatus => "connectionStatus",
            Self::Error => "error",
            Self::SystemStatus => "systemStatus",
        }
    }
}

/// An asynchronous notification from the clock task to the BLE client.
#[derive(Debug, Clone)]
pub struct ClockEvent {
    pub kind: EventKind,
    pub timestamp_ms: u64,
    pub priority: u8,
    pub data: Map<String, Value>,
}

impl ClockEvent {
    /// A priority-1 time update carrying both timer triples.
    pub fn time_update(timestamp_ms: u64, time: &super::ClockTime) -> Self {
        let mut data = Map::new();
        data.insert(
            "left".into(),
            json!({
                "hours": time.left_h,
                "minutes": time.left_m,
                "seconds": time.left_s,
            }),
        );
        data.insert(
            "right".into(),
            json!({
                "hours": time.right_h,
                "minutes": time.right_m,
                "seconds": time.right_s,
            }),
        );
        Self {
            kind: EventKind::TimeUpdate,
            timestamp_ms,
            priority: PRIORITY_NORMAL,
            data,
        }
    }

    /// A priority-0 button event. `repeat_count` is only present on
    /// repeats.
    pub fn button(
        timestamp_ms: u64,
        name: &str,
        code: u8,
        is_repeat: bool,
        repeat_count: Option<u32>,
    ) -> Self {
        let mut data = Map::new();
        data.insert("button".into(), Value::from(name));
        data.insert("buttonCode".into(), Value::from(code));
        data.insert("isRepeat".into(), Value::from(is_repeat));
        if let Some(n) = repeat_count {
            data.insert("repeatCount".into(), Value::from(n));
        }
        Self {
            kind: EventKind::ButtonEvent,
            timestamp_ms,
            priority: PRIORITY_HIGH,
            data,
        }
    }

    /// Connection transition, emitted whenever either flag changes.
    pub fn connection_status(timestamp_ms: u64, connected: bool, configured: bool) -> Self {
        let mut data = Map::new();
        data.insert("connected".into(), Value::from(connected));
        data.insert("configured".into(), Value::from(configured));
        Self {
            kind: EventKind::ConnectionStatus,
            timestamp_ms,
            priority: PRIORITY_NORMAL,
            data,
        }
    }

    /// A priority-0 error event for spontaneous (non-command) failures.
    pub fn error(timestamp_ms: u64, code: crate::error::SystemErrorCode, message: &str) -> Self {
        let mut data = Map::new();
        data.insert("errorCode".into(), Value::from(code.code()));
        data.insert("errorMessage".into(), Value::from(message));
        Self {
            kind: EventKind::Error,
            timestamp_ms,
            priority: PRIORITY_HIGH,
            data,
        }
    }

    /// A full system-status snapshot (sent on subscribe).
    pub fn system_status(timestamp_ms: u64, snapshot: Map<String, Value>) -> Self {
        Self {
            kind: EventKind::SystemStatus,
            timestamp_ms,
            priority: PRIORITY_NORMAL,
            data: snapshot,
        }
    }

    /// Serialize to the notification wire shape.
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.kind.wire_name(),
            "timestamp": self.timestamp_ms,
            "data": Value::Object(self.data.clone()),
        })
    }
}
