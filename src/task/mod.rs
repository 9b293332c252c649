//! The clock task — BLE-driven lifecycle and the 100 Hz service loop.
//!
//! Owns the only [`ClockLink`] instance and runs pinned to the app core
//! at elevated priority. Each loop iteration:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ 1. BLE lifecycle edges (connect / disconnect / subscribe) │
//! │ 2. Drain at most one RawCommand → dispatch → response     │
//! │ 3. If configured: inbound (buttons, repeats, time)        │
//! │ 4. monitor_connection() — transitions + paced recovery    │
//! │ 5. Statistics + queue health                              │
//! │ 6. Feed watchdog, sleep the remainder of the period       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The tick body is side-effect free with respect to wall time — it
//! takes `now_ms` as a parameter — so tests drive it with a synthetic
//! clock and scripted buses.

pub mod dispatch;
pub mod repeat;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::adapters::ble::BleSignals;
use crate::app::events::PRIORITY_HIGH;
use crate::app::{ClockEvent, StatusRegistry};
use crate::config::GatewayConfig;
use crate::error::SystemErrorCode;
use crate::link::bus::ClockBus;
use crate::link::rx::button_name;
use crate::link::{ClockLink, LinkState};
use crate::transport::{HealthMonitor, QueueHub};

use dispatch::DispatchCtx;
use repeat::ButtonRepeatMonitor;

// ───────────────────────────────────────────────────────────────
// Task state
// ───────────────────────────────────────────────────────────────

/// Lifecycle of the clock task itself (distinct from the link state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Idle = 0,
    Initialized = 1,
    Running = 2,
    Stopping = 3,
    Error = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Error,
            _ => Self::Idle,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ClockTask
// ───────────────────────────────────────────────────────────────

/// The dedicated-core task driving the clock link.
pub struct ClockTask<B: ClockBus> {
    link: ClockLink<B>,
    queues: Arc<QueueHub>,
    signals: Arc<BleSignals>,
    status: Arc<StatusRegistry>,
    cfg: GatewayConfig,
    state: AtomicU8,
    repeat: ButtonRepeatMonitor,
    health: HealthMonitor,

    // Edge tracking against the BLE signal flags.
    ble_seen_connected: bool,
    ble_seen_subscribed: bool,
    /// Last `(connected, configured)` pair reported to clients.
    last_conn: (bool, bool),

    // Recovery pacing.
    recovery_attempts: u32,
    last_recovery_ms: u64,
    initializing: bool,
}

impl<B: ClockBus> ClockTask<B> {
    pub fn new(
        link: ClockLink<B>,
        queues: Arc<QueueHub>,
        signals: Arc<BleSignals>,
        status: Arc<StatusRegistry>,
        cfg: GatewayConfig,
    ) -> Self {
        let repeat = ButtonRepeatMonitor::new(cfg.repeat_first_ms, cfg.repeat_interval_ms);
        let health = HealthMonitor::new(cfg.health_check_interval_ms, cfg.utilization_threshold);
        Self {
            link,
            queues,
            signals,
            status,
            cfg,
            state: AtomicU8::new(TaskState::Idle as u8),
            repeat,
            health,
            ble_seen_connected: false,
            ble_seen_subscribed: false,
            last_conn: (false, false),
            recovery_attempts: 0,
            last_recovery_ms: 0,
            initializing: false,
        }
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: TaskState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Borrow the bus adapter under the link.
    pub fn bus(&self) -> &B {
        self.link.bus()
    }

    /// Mutably borrow the bus adapter under the link.
    pub fn bus_mut(&mut self) -> &mut B {
        self.link.bus_mut()
    }

    // ── Service loop ──────────────────────────────────────────

    /// Run forever at the configured period, feeding the watchdog every
    /// iteration. Spawn this on the dedicated core.
    pub fn run(&mut self) -> ! {
        let watchdog = crate::drivers::watchdog::Watchdog::new();
        let time = crate::adapters::time::TimeAdapter::new();
        let period = Duration::from_millis(u64::from(self.cfg.loop_period_ms));
        info!("clock task: loop started ({} ms period)", self.cfg.loop_period_ms);
        loop {
            let started = Instant::now();
            self.tick(time.uptime_ms());
            watchdog.feed();
            let elapsed = started.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
    }

    /// One loop iteration. Public so tests can drive it directly.
    pub fn tick(&mut self, now_ms: u64) {
        self.handle_ble_edges(now_ms);
        self.drain_one_command(now_ms);
        if self.link.is_configured() {
            self.handle_inbound(now_ms);
        }
        self.monitor_connection(now_ms);
        let _ = self.health.check(
            now_ms,
            &[
                (self.queues.raw_commands.depth(), self.queues.raw_commands.capacity()),
                (self.queues.events.depth(), self.queues.events.capacity()),
                (self.queues.responses.depth(), self.queues.responses.capacity()),
            ],
        );
    }

    // ── BLE lifecycle ─────────────────────────────────────────

    fn handle_ble_edges(&mut self, now_ms: u64) {
        let connected = self.signals.is_connected();
        if connected && !self.ble_seen_connected {
            self.ble_seen_connected = true;
            self.on_ble_connected(now_ms);
        } else if !connected && self.ble_seen_connected {
            self.ble_seen_connected = false;
            self.on_ble_disconnected();
        }

        let subscribed = self.signals.is_subscribed();
        if subscribed && !self.ble_seen_subscribed {
            self.ble_seen_subscribed = true;
            // Initial status for a fresh subscriber jumps the queue so
            // it beats any backlog of time updates.
            let mut ev = ClockEvent::connection_status(
                now_ms,
                self.link.is_connected(),
                self.link.is_configured(),
            );
            ev.priority = PRIORITY_HIGH;
            self.emit(ev);
        } else if !subscribed && self.ble_seen_subscribed {
            self.ble_seen_subscribed = false;
        }
    }

    fn on_ble_connected(&mut self, now_ms: u64) {
        info!("clock task: BLE client connected, configuring clock");
        self.set_state(TaskState::Initialized);
        self.initializing = true;

        let result = if self.link.state() == LinkState::Uninitialized {
            self.link.begin().and_then(|()| self.link.configure())
        } else {
            self.link.configure()
        };

        match result {
            Ok(()) => {
                self.set_state(TaskState::Running);
                self.recovery_attempts = 0;
            }
            Err(e) => {
                // Stay alive: recovery keeps retrying while BLE is up.
                warn!("clock task: initial configure failed ({})", e);
                let code = SystemErrorCode::from(e);
                self.status.record_error(code, &e.to_string());
                self.emit(ClockEvent::error(now_ms, code, &e.to_string()));
                self.set_state(TaskState::Error);
                self.last_recovery_ms = now_ms;
            }
        }
        self.initializing = false;
    }

    /// Equivalent of the restart-on-disconnect of the original design:
    /// every piece of connection-bound state is torn down so the next
    /// connect starts from scratch.
    fn on_ble_disconnected(&mut self) {
        info!("clock task: BLE client disconnected, tearing down");
        self.set_state(TaskState::Stopping);
        let _ = self.link.power_off();
        self.link.end();
        self.queues.flush_all();
        self.queues.stats.reset();
        self.status.reset();
        self.repeat.reset();
        self.recovery_attempts = 0;
        self.last_recovery_ms = 0;
        self.last_conn = (false, false);
        self.ble_seen_subscribed = false;
        self.set_state(TaskState::Idle);
    }

    // ── Command path ──────────────────────────────────────────

    fn drain_one_command(&mut self, now_ms: u64) {
        let Some(raw) = self.queues.raw_commands.recv(0) else {
            return;
        };
        let ctx = DispatchCtx {
            status: self.status.as_ref(),
            ble_connected: self.signals.is_connected(),
            now_ms,
        };
        let response = dispatch::handle(&raw, &mut self.link, &ctx);
        self.status.count_command();
        if let Some(resp) = response {
            if !self.queues.responses.send(resp, self.cfg.loop_period_ms * 10) {
                self.queues.stats.note_timeout();
                warn!("clock task: response queue full, response dropped");
            }
        }
    }

    // ── Inbound events ────────────────────────────────────────

    fn handle_inbound(&mut self, now_ms: u64) {
        self.link.poll();

        // Discrete button events take the priority path; each one also
        // restarts the hold window.
        while let Some(code) = self.link.get_button_event() {
            self.repeat.reset();
            self.emit(ClockEvent::button(
                now_ms,
                button_name(code),
                code,
                false,
                None,
            ));
        }

        if let Some((mask, count)) = self.repeat.poll(self.link.get_button_state(), now_ms) {
            self.emit(ClockEvent::button(
                now_ms,
                button_name(mask),
                mask,
                true,
                Some(count),
            ));
        }

        if let Some(time) = self.link.take_new_time() {
            self.emit(ClockEvent::time_update(now_ms, &time));
        }
    }

    // ── Connection monitoring and recovery ────────────────────

    fn monitor_connection(&mut self, now_ms: u64) {
        let conn = (self.link.is_connected(), self.link.is_configured());
        if conn != self.last_conn {
            self.last_conn = conn;
            self.emit(ClockEvent::connection_status(now_ms, conn.0, conn.1));
            if !conn.0 {
                // Pace the first recovery attempt from the moment of
                // loss, not from boot.
                self.last_recovery_ms = now_ms;
                if self.state() == TaskState::Running {
                    self.set_state(TaskState::Error);
                }
            }
        }

        let wants_recovery =
            self.signals.is_connected() && !self.link.is_connected() && !self.initializing;
        if !wants_recovery {
            return;
        }
        if now_ms.saturating_sub(self.last_recovery_ms) < u64::from(self.cfg.recovery_delay_ms) {
            return;
        }
        if self.cfg.max_recovery_attempts != 0
            && self.recovery_attempts >= self.cfg.max_recovery_attempts
        {
            return;
        }

        self.recovery_attempts += 1;
        self.last_recovery_ms = now_ms;
        info!(
            "clock task: recovery attempt {} — reconfiguring",
            self.recovery_attempts
        );
        match self.link.configure() {
            Ok(()) => {
                info!("clock task: recovery succeeded");
                self.recovery_attempts = 0;
                self.set_state(TaskState::Running);
                // The state transition above flips the flags; the next
                // monitor pass emits the positive connectionStatus.
            }
            Err(e) => {
                warn!("clock task: recovery failed ({})", e);
                let code = SystemErrorCode::from(e);
                self.status.record_error(code, &e.to_string());
                self.emit(ClockEvent::error(now_ms, code, &e.to_string()));
            }
        }
    }

    // ── Event emission ────────────────────────────────────────

    fn emit(&self, ev: ClockEvent) {
        self.status.count_event();
        let ok = if ev.priority == PRIORITY_HIGH {
            self.queues.events.send_priority(ev, 0)
        } else {
            self.queues.events.send(ev, 0)
        };
        if ok {
            self.queues.stats.note_event_queued(self.queues.events.depth());
        } else {
            self.queues.stats.note_overflow();
        }
    }
}
