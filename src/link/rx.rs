//! Inbound frame dispatch and lock-free receive state.
//!
//! [`RxShared`] is the only state the slave-receive path touches. It is
//! written from interrupt-adjacent context and polled by the clock
//! task, so everything here is an atomic: consume-on-read flags for
//! ACK / ping / time, a packed tear-free time snapshot, the raw button
//! mask, and a 16-slot overwrite-oldest ring of classified button
//! events.
//!
//! ```text
//!  slave bus ──▶ dispatch_frame() ──▶ flags / snapshot / ring
//!                                          ▲
//!                        clock task ───────┘  (poll, consume)
//! ```
//!
//! `dispatch_frame` must run to completion quickly and never block; it
//! acquires no lock and allocates nothing.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::app::ClockTime;

use super::{crc, frame};

/// Capacity of the button-event ring. Power of 2 — and 256 (the u8
/// index wrap) is a multiple of it, so free-running indices stay
/// consistent across wraparound.
const BUTTON_RING_CAP: usize = 16;

// ── Button event codes ───────────────────────────────────────

/// Mask of the five main buttons.
pub const BUTTONS_MAIN_MASK: u8 = 0x1F;
/// On/off key state bit.
pub const BUTTON_ONOFF_BIT: u8 = 0x20;
/// Lever state bit.
pub const BUTTON_LEVER_BIT: u8 = 0x40;

pub const EVENT_ONOFF_PRESS: u8 = 0x20;
pub const EVENT_ONOFF_RELEASE: u8 = 0xA0;
pub const EVENT_LEVER_LEFT: u8 = 0xC0;
pub const EVENT_LEVER_RIGHT: u8 = 0x40;

/// Wire name of a classified button event code.
pub fn button_name(code: u8) -> &'static str {
    match code {
        0x01 => "back",
        0x02 => "minus",
        0x04 => "play_pause",
        0x08 => "plus",
        0x10 => "forward",
        EVENT_ONOFF_PRESS => "on_off",
        EVENT_ONOFF_RELEASE => "on_off_release",
        EVENT_LEVER_LEFT => "lever_left",
        EVENT_LEVER_RIGHT => "lever_right",
        _ => "unknown",
    }
}

// ── Shared receive state ─────────────────────────────────────

/// Lock-free state shared between the slave-receive path and the clock
/// task. Single producer per field.
pub struct RxShared {
    // Time snapshot
    new_time: AtomicBool,
    time: AtomicU64,

    // ACK tracking
    new_ack: AtomicBool,
    ack_code: AtomicU8,

    // Wake-up handshake
    new_ping_response: AtomicBool,

    // Connection flags (callback promotes Connected on live time frames)
    connected: AtomicBool,
    configured: AtomicBool,

    // Buttons
    button_state: AtomicU8,
    ring: [AtomicU8; BUTTON_RING_CAP],
    ring_head: AtomicU8,
    ring_tail: AtomicU8,

    // Diagnostics
    crc_errors: AtomicU32,
    dropped_frames: AtomicU32,
}

impl Default for RxShared {
    fn default() -> Self {
        Self::new()
    }
}

impl RxShared {
    pub fn new() -> Self {
        Self {
            new_time: AtomicBool::new(false),
            time: AtomicU64::new(0),
            new_ack: AtomicBool::new(false),
            ack_code: AtomicU8::new(0),
            new_ping_response: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            configured: AtomicBool::new(false),
            button_state: AtomicU8::new(0),
            ring: core::array::from_fn(|_| AtomicU8::new(0)),
            ring_head: AtomicU8::new(0),
            ring_tail: AtomicU8::new(0),
            crc_errors: AtomicU32::new(0),
            dropped_frames: AtomicU32::new(0),
        }
    }

    // ── Time ──────────────────────────────────────────────────

    /// Consume the new-time flag; returns the snapshot when one arrived
    /// since the previous call.
    pub fn take_new_time(&self) -> Option<ClockTime> {
        if self.new_time.swap(false, Ordering::AcqRel) {
            Some(ClockTime::unpack(self.time.load(Ordering::Acquire)))
        } else {
            None
        }
    }

    /// Last stored snapshot, without consuming the flag.
    pub fn time_snapshot(&self) -> ClockTime {
        ClockTime::unpack(self.time.load(Ordering::Acquire))
    }

    // ── ACK ───────────────────────────────────────────────────

    /// Clear any stale ACK before a send.
    pub fn clear_ack(&self) {
        self.new_ack.store(false, Ordering::Release);
    }

    /// Non-consuming read: the pending ACK code, if any.
    pub fn ack_pending(&self) -> Option<u8> {
        if self.new_ack.load(Ordering::Acquire) {
            Some(self.ack_code.load(Ordering::Acquire))
        } else {
            None
        }
    }

    // ── Ping ──────────────────────────────────────────────────

    pub fn clear_ping_response(&self) {
        self.new_ping_response.store(false, Ordering::Release);
    }

    /// Consume the ping-response flag.
    pub fn take_ping_response(&self) -> bool {
        self.new_ping_response.swap(false, Ordering::AcqRel)
    }

    // ── Connection flags ──────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, v: bool) {
        self.connected.store(v, Ordering::Release);
    }

    pub fn set_configured(&self, v: bool) {
        self.configured.store(v, Ordering::Release);
    }

    // ── Buttons ───────────────────────────────────────────────

    /// Current raw button mask as last reported by the clock.
    pub fn button_state(&self) -> u8 {
        self.button_state.load(Ordering::Acquire)
    }

    /// Pop one classified button event from the ring.
    pub fn pop_button_event(&self) -> Option<u8> {
        let tail = self.ring_tail.load(Ordering::Acquire);
        let head = self.ring_head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let code = self.ring[tail as usize % BUTTON_RING_CAP].load(Ordering::Acquire);
        self.ring_tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(code)
    }

    fn push_button_event(&self, code: u8) {
        let head = self.ring_head.load(Ordering::Acquire);
        let tail = self.ring_tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) as usize >= BUTTON_RING_CAP {
            // Full: overwrite the oldest by advancing the tail.
            self.ring_tail.store(tail.wrapping_add(1), Ordering::Release);
        }
        self.ring[head as usize % BUTTON_RING_CAP].store(code, Ordering::Release);
        self.ring_head.store(head.wrapping_add(1), Ordering::Release);
    }

    // ── Diagnostics ───────────────────────────────────────────

    pub fn crc_errors(&self) -> u32 {
        self.crc_errors.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u32 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Reset everything to power-on state (disconnect teardown).
    pub fn reset(&self) {
        self.new_time.store(false, Ordering::Release);
        self.time.store(0, Ordering::Release);
        self.new_ack.store(false, Ordering::Release);
        self.new_ping_response.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        self.configured.store(false, Ordering::Release);
        self.button_state.store(0, Ordering::Release);
        let head = self.ring_head.load(Ordering::Acquire);
        self.ring_tail.store(head, Ordering::Release);
        self.crc_errors.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
    }
}

// ── Inbound dispatch ─────────────────────────────────────────

/// Classify one inbound frame and update the shared state.
///
/// Runs in the slave-receive context: no locks, no allocation, no
/// blocking. Invalid frames are counted and dropped.
pub fn dispatch_frame(rx: &RxShared, buf: &[u8]) {
    if buf.len() < 3 || buf[0] != frame::INBOUND_START {
        rx.dropped_frames.fetch_add(1, Ordering::Relaxed);
        return;
    }

    match buf[2] {
        frame::MSG_ACK => {
            if buf.len() < 5 || !crc::verify_inbound(buf) {
                rx.crc_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
            rx.ack_code.store(buf[3], Ordering::Release);
            rx.new_ack.store(true, Ordering::Release);
        }

        frame::MSG_PING_RESPONSE => {
            // The wake-up response is a fixed byte string; anything else
            // with this marker is noise.
            if buf.len() >= 6 && buf[..6] == frame::PING_RESPONSE {
                rx.new_ping_response.store(true, Ordering::Release);
            } else {
                rx.dropped_frames.fetch_add(1, Ordering::Relaxed);
            }
        }

        frame::MSG_TIME => {
            if buf.len() < 14 || buf[1] != 0x18 {
                rx.dropped_frames.fetch_add(1, Ordering::Relaxed);
                return;
            }
            // A display echo of our own SetAndRun, not a tick.
            if buf.len() > 19 && buf[19] == 1 {
                return;
            }
            let time = ClockTime::new(
                buf[4] & 0x0F,
                frame::bcd_decode(buf[5]),
                frame::bcd_decode(buf[6]),
                buf[10] & 0x0F,
                frame::bcd_decode(buf[11]),
                frame::bcd_decode(buf[12]),
            );
            if !time.is_valid() {
                rx.dropped_frames.fetch_add(1, Ordering::Relaxed);
                return;
            }
            rx.time.store(time.pack(), Ordering::Release);
            rx.new_time.store(true, Ordering::Release);
            // Time alone proves the clock is alive, but it may have
            // been reset behind our back: demand a reconfigure.
            if !rx.connected.load(Ordering::Acquire) {
                rx.configured.store(false, Ordering::Release);
                rx.connected.store(true, Ordering::Release);
            }
        }

        frame::MSG_BUTTON => {
            if buf.len() < 5 || !crc::verify_inbound(buf) {
                rx.crc_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let current = buf[3];
            let previous = buf[4];
            rx.button_state.store(current, Ordering::Release);
            if let Some(code) = classify_button(current, previous) {
                rx.push_button_event(code);
            }
        }

        other => {
            log::debug!("rx: unknown frame kind 0x{:02X}, dropped", other);
            rx.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Classify a `(current, previous)` state pair into at most one event,
/// in priority order: on/off, lever, main buttons.
pub fn classify_button(current: u8, previous: u8) -> Option<u8> {
    let changed = current ^ previous;
    if changed & BUTTON_ONOFF_BIT != 0 {
        return Some(if current & BUTTON_ONOFF_BIT != 0 {
            EVENT_ONOFF_PRESS
        } else {
            EVENT_ONOFF_RELEASE
        });
    }
    if changed & BUTTON_LEVER_BIT != 0 {
        return Some(if current & BUTTON_LEVER_BIT != 0 {
            EVENT_LEVER_LEFT
        } else {
            EVENT_LEVER_RIGHT
        });
    }
    let main_pressed = changed & current & BUTTONS_MAIN_MASK;
    if main_pressed != 0 {
        Some(main_pressed)
    } else {
        None
    }
}

// ── Test scaffolding ─────────────────────────────────────────

/// Synthesize an inbound ACK frame for the given command code.
#[doc(hidden)]
pub fn make_ack_frame(code: u8) -> [u8; 5] {
    let mut buf = [frame::INBOUND_START, 0x06, frame::MSG_ACK, code, 0];
    crc::fill_inbound(&mut buf);
    buf
}

/// Synthesize an inbound button frame for a state pair.
#[doc(hidden)]
pub fn make_button_frame(current: u8, previous: u8) -> [u8; 6] {
    let mut buf = [
        frame::INBOUND_START,
        0x07,
        frame::MSG_BUTTON,
        current,
        previous,
        0,
    ];
    crc::fill_inbound(&mut buf);
    buf
}

/// Synthesize an inbound time frame. `echo` marks it as a display echo.
#[doc(hidden)]
pub fn make_time_frame(time: &ClockTime, echo: bool) -> [u8; 23] {
    let mut buf = [0u8; 23];
    buf[0] = frame::INBOUND_START;
    buf[1] = 0x18;
    buf[2] = frame::MSG_TIME;
    buf[4] = time.left_h;
    buf[5] = frame::bcd_encode(time.left_m.min(99));
    buf[6] = frame::bcd_encode(time.left_s.min(99));
    buf[10] = time.right_h;
    buf[11] = frame::bcd_encode(time.right_m.min(99));
    buf[12] = frame::bcd_encode(time.right_s.min(99));
    buf[19] = u8::from(echo);
    crc::fill_inbound(&mut buf);
    buf
}
