//! Button auto-repeat detection.
//!
//! The clock only reports edges, so held buttons are synthesized here:
//! the task polls the raw mask every loop tick, and once one of the
//! five main buttons has been held past the first-hold threshold the
//! monitor emits repeats at a fixed cadence until the mask changes.
//! On/off and lever bits never repeat.

use crate::link::rx::BUTTONS_MAIN_MASK;

/// Tick-driven hold/repeat state machine.
#[derive(Debug)]
pub struct ButtonRepeatMonitor {
    first_ms: u32,
    interval_ms: u32,
    active: bool,
    last_mask: u8,
    last_ts: u64,
    repeat_count: u32,
}

impl ButtonRepeatMonitor {
    pub fn new(first_ms: u32, interval_ms: u32) -> Self {
        Self {
            first_ms,
            interval_ms,
            active: false,
            last_mask: 0,
            last_ts: 0,
            repeat_count: 0,
        }
    }

    /// Feed the current raw button state. Returns `(mask, repeat_count)`
    /// when a repeat fires.
    pub fn poll(&mut self, raw_state: u8, now_ms: u64) -> Option<(u8, u32)> {
        let mask = raw_state & BUTTONS_MAIN_MASK;

        if mask == 0 {
            self.reset();
            return None;
        }

        if !self.active || mask != self.last_mask {
            // New hold (or the held combination changed): restart.
            self.active = true;
            self.last_mask = mask;
            self.last_ts = now_ms;
            self.repeat_count = 0;
            return None;
        }

        let threshold = if self.repeat_count == 0 {
            self.first_ms
        } else {
            self.interval_ms
        };
        if now_ms.saturating_sub(self.last_ts) >= u64::from(threshold) {
            self.repeat_count += 1;
            self.last_ts = now_ms;
            return Some((mask, self.repeat_count));
        }
        None
    }

    /// Forget the current hold. Called on every discrete button event so
    /// a fresh press starts its own hold window.
    pub fn reset(&mut self) {
        self.active = false;
        self.last_mask = 0;
        self.last_ts = 0;
        self.repeat_count = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
