//! System status registry.
//!
//! Cumulative counters and last-error tracking shared between the clock
//! task (writer of command/event counters and errors) and the BLE loop
//! (reader, and writer of the notification counter). Every field has
//! exactly one writer; all counters are relaxed atomics, so readers on
//! the other core see values that are individually consistent without
//! any locking.

use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::SystemErrorCode;

/// Queue depths sampled for a status snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueDepths {
    pub raw_commands: usize,
    pub events: usize,
    pub responses: usize,
}

/// Shared counters and last-error state.
pub struct StatusRegistry {
    /// Commands drained and dispatched by the clock task.
    commands_processed: AtomicU32,
    /// Events the clock task generated (queued or dropped).
    events_generated: AtomicU32,
    /// Notifications the BLE loop actually sent.
    notifications_sent: AtomicU32,
    /// Last wire-visible error code; `SUCCESS` when none.
    last_error_code: AtomicU16,
    /// Last error text. Written only by the clock task.
    last_error_message: Mutex<heapless::String<128>>,
    /// Ambient temperature in deci-degrees Celsius, `i32::MIN` = unknown.
    temperature_dc: core::sync::atomic::AtomicI32,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            commands_processed: AtomicU32::new(0),
            events_generated: AtomicU32::new(0),
            notifications_sent: AtomicU32::new(0),
            last_error_code: AtomicU16::new(SystemErrorCode::Success.code()),
            last_error_message: Mutex::new(heapless::String::new()),
            temperature_dc: core::sync::atomic::AtomicI32::new(i32::MIN),
        }
    }

    pub fn count_command(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_event(&self) {
        self.events_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_notification(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commands_processed(&self) -> u32 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    pub fn events_generated(&self) -> u32 {
        self.events_generated.load(Ordering::Relaxed)
    }

    /// Record the most recent failure. Clock-task context only.
    pub fn record_error(&self, code: SystemErrorCode, message: &str) {
        self.last_error_code.store(code.code(), Ordering::Relaxed);
        if let Ok(mut slot) = self.last_error_message.lock() {
            slot.clear();
            let _ = slot.push_str(&message[..message.len().min(128)]);
        }
    }

    pub fn last_error_code(&self) -> u16 {
        self.last_error_code.load(Ordering::Relaxed)
    }

    pub fn last_error_message(&self) -> String {
        self.last_error_message
            .lock()
            .map(|s| s.as_str().to_owned())
            .unwrap_or_default()
    }

    pub fn set_temperature_c(&self, celsius: f32) {
        self.temperature_dc
            .store((celsius * 10.0) as i32, Ordering::Relaxed);
    }

    /// Zero every counter and clear the error slot. Part of the
    /// disconnect teardown: a new BLE session starts from scratch.
    pub fn reset(&self) {
        self.commands_processed.store(0, Ordering::Relaxed);
        self.events_generated.store(0, Ordering::Relaxed);
        self.notifications_sent.store(0, Ordering::Relaxed);
        self.last_error_code
            .store(SystemErrorCode::Success.code(), Ordering::Relaxed);
        if let Ok(mut slot) = self.last_error_message.lock() {
            slot.clear();
        }
    }

    /// Build the status JSON published on the status characteristic and
    /// in `systemStatus` events.
    pub fn snapshot(
        &self,
        uptime_ms: u64,
        free_heap: u32,
        depths: QueueDepths,
        clock_connected: bool,
        clock_configured: bool,
        ble_connected: bool,
    ) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("uptimeMs".into(), Value::from(uptime_ms));
        m.insert("freeHeap".into(), Value::from(free_heap));
        m.insert(
            "commandsProcessed".into(),
            Value::from(self.commands_processed()),
        );
        m.insert(
            "eventsGenerated".into(),
            Value::from(self.events_generated()),
        );
        m.insert(
            "notificationsSent".into(),
            Value::from(self.notifications_sent.load(Ordering::Relaxed)),
        );
        m.insert(
            "queueDepths".into(),
            serde_json::json!({
                "rawCommands": depths.raw_commands,
                "events": depths.events,
                "responses": depths.responses,
            }),
        );
        m.insert("clockConnected".into(), Value::from(clock_connected));
        m.insert("clockConfigured".into(), Value::from(clock_configured));
        m.insert("bleConnected".into(), Value::from(ble_connected));
        m.insert("lastErrorCode".into(), Value::from(self.last_error_code()));
        m.insert(
            "lastErrorMessage".into(),
            Value::from(self.last_error_message()),
        );
        let t = self.temperature_dc.load(Ordering::Relaxed);
        if t != i32::MIN {
            m.insert("temperatureC".into(), Value::from(f64::from(t) / 10.0));
        }
        m
    }
}
