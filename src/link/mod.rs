//! DGT3000 link layer.
//!
//! [`ClockLink`] encapsulates all I2C traffic with the clock: frame
//! construction and CRC ([`frame`], [`crc`]), the retrying send engine
//! with ACK tracking, the wake-up ping handshake, the configuration
//! sequence, and the inbound dispatch state ([`rx`]).
//!
//! ```text
//! Uninitialized --begin--> Initialized --configure ok--> Configured
//! Configured --transient send failure--> Initialized (recovery-eligible)
//! Configured --power-off--> Initialized
//! Any --end--> Uninitialized
//! ```
//!
//! Two commands (EndDisplay, SetAndRun) deliberately skip the ACK wait:
//! waiting would re-bind the slave to the ACK address, and the ~10 ms
//! re-bind window is long enough to lose button frames in practice.

pub mod bus;
pub mod crc;
pub mod frame;
pub mod rx;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ClockTime;
use crate::config::GatewayConfig;
use crate::error::{LinkError, LinkResult};

use bus::ClockBus;
use frame::{
    ADDR_CLOCK, ADDR_LISTEN_ACK, ADDR_LISTEN_DATA, ADDR_WAKEUP, CMD_CHANGE_STATE, CMD_DISPLAY,
    CMD_SET_CENTRAL_CONTROL, ClockMode, DISPLAY_TEXT_LEN, LEFT_DOTS_MASK, MAX_BEEP,
    RIGHT_DOTS_MASK, STATE_OFF, STATE_RUN,
};
pub use rx::RxShared;

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

/// Externally observable state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Initialized,
    Connected,
    Configured,
}

// ───────────────────────────────────────────────────────────────
// ClockLink
// ───────────────────────────────────────────────────────────────

/// The one object that talks to the clock. Owns the bus adapter; shares
/// the receive state with the slave-receive path via [`RxShared`].
pub struct ClockLink<B: ClockBus> {
    bus: B,
    rx: Arc<RxShared>,
    cfg: GatewayConfig,
    begun: bool,
    configuring: bool,
    last_error: Option<LinkError>,
}

impl<B: ClockBus> ClockLink<B> {
    pub fn new(bus: B, rx: Arc<RxShared>, cfg: GatewayConfig) -> Self {
        Self {
            bus,
            rx,
            cfg,
            begun: false,
            configuring: false,
            last_error: None,
        }
    }

    /// Shared receive state handle (for wiring the slave callback).
    pub fn rx(&self) -> Arc<RxShared> {
        Arc::clone(&self.rx)
    }

    /// Borrow the underlying bus adapter.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the underlying bus adapter.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring the buses up and start listening for data frames.
    pub fn begin(&mut self) -> LinkResult<()> {
        self.bus.set_listen_addr(ADDR_LISTEN_DATA)?;
        self.begun = true;
        info!("link: initialized, listening on 0x00");
        Ok(())
    }

    /// Tear the link down completely.
    pub fn end(&mut self) {
        self.begun = false;
        self.configuring = false;
        self.last_error = None;
        self.rx.reset();
        info!("link: ended");
    }

    /// Current state, derived from the lifecycle and receive flags.
    pub fn state(&self) -> LinkState {
        if !self.begun {
            LinkState::Uninitialized
        } else if self.rx.is_configured() {
            LinkState::Configured
        } else if self.rx.is_connected() {
            LinkState::Connected
        } else {
            LinkState::Initialized
        }
    }

    pub fn is_connected(&self) -> bool {
        self.rx.is_connected()
    }

    pub fn is_configured(&self) -> bool {
        self.rx.is_configured()
    }

    // ── Send engine ───────────────────────────────────────────

    /// Transmit `frame_bytes` to `target`, optionally awaiting an ACK on
    /// `ack_listen` for `expected_ack`, with up to `send_retries`
    /// attempts when `with_retry`.
    ///
    /// Per attempt: bind the slave to the ACK listen address, clear any
    /// stale ACK, transmit, and poll. After a successful ACK (or when no
    /// ACK is required with `ack_listen == 0x00`) the slave is back on
    /// the data address so time/button frames are not missed.
    #[allow(clippy::too_many_arguments)]
    fn send(
        &mut self,
        name: &str,
        frame_bytes: &[u8],
        ack_listen: u8,
        expected_ack: u8,
        acks_required: u8,
        target: u8,
        with_retry: bool,
    ) -> LinkResult<()> {
        if !self.begun {
            return Err(self.record(LinkError::NotConfigured));
        }

        let attempts = if with_retry {
            self.cfg.send_retries.max(1)
        } else {
            1
        };

        for attempt in 1..=attempts {
            self.bus.set_listen_addr(ack_listen)?;
            self.rx.clear_ack();

            if let Err(e) = self.bus.master_write(target, frame_bytes) {
                warn!(
                    "link: {} master write failed ({}), attempt {}/{}",
                    name, e, attempt, attempts
                );
                self.record(LinkError::I2cComm);
                if !with_retry {
                    // Fire-and-forget (wake-up ping): failure to reach a
                    // sleeping clock is expected, not an error.
                    return Ok(());
                }
                continue;
            }

            if acks_required == 0 {
                return Ok(());
            }

            if self.wait_for_ack(expected_ack) {
                self.bus.set_listen_addr(ADDR_LISTEN_DATA)?;
                debug!("link: {} acked (0x{:02X})", name, expected_ack);
                return Ok(());
            }

            warn!(
                "link: {} no ACK (expect 0x{:02X}), attempt {}/{}",
                name, expected_ack, attempt, attempts
            );
            self.record(LinkError::NoAck);
        }

        // Exhausted: get back onto the data address and flag the loss.
        let _ = self.bus.set_listen_addr(ADDR_LISTEN_DATA);
        self.rx.set_connected(false);
        self.rx.set_configured(false);
        warn!("link: {} failed after {} attempts, connection lost", name, attempts);
        Err(self.last_error.unwrap_or(LinkError::I2cComm))
    }

    /// Poll for `new_ack` carrying `expected` within the ACK window.
    /// ACKs for other codes are ignored.
    fn wait_for_ack(&mut self, expected: u8) -> bool {
        let deadline = Instant::now() + Duration::from_millis(u64::from(self.cfg.ack_timeout_ms));
        loop {
            self.bus.poll_inbound(&self.rx);
            if let Some(code) = self.rx.ack_pending() {
                if code == expected {
                    self.rx.clear_ack();
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(u64::from(self.cfg.ack_poll_ms)));
        }
    }

    // ── Ping handshake ────────────────────────────────────────

    /// Fire a wake-up ping at the alias address and wait for the fixed
    /// response. `true` means the clock was asleep and is waking now; a
    /// timeout is not fatal — the caller decides what it means.
    pub fn send_ping(&mut self) -> bool {
        self.rx.clear_ping_response();
        let ping = frame::ping();
        if self
            .send("ping", &ping, ADDR_LISTEN_DATA, 0, 0, ADDR_WAKEUP, false)
            .is_err()
        {
            return false;
        }

        let deadline = Instant::now() + Duration::from_millis(u64::from(self.cfg.ping_timeout_ms));
        loop {
            self.bus.poll_inbound(&self.rx);
            if self.rx.take_ping_response() {
                info!("link: wake-up ping answered");
                return true;
            }
            if Instant::now() >= deadline {
                debug!("link: wake-up ping timed out");
                return false;
            }
            std::thread::sleep(Duration::from_millis(u64::from(self.cfg.ack_poll_ms)));
        }
    }

    // ── Configure sequence ────────────────────────────────────

    /// Take central control of the clock. Runs on BLE connect and on
    /// every recovery attempt.
    pub fn configure(&mut self) -> LinkResult<()> {
        if self.configuring {
            warn!("link: configure re-entered, rejected");
            return Err(LinkError::NotConfigured);
        }
        self.configuring = true;
        let result = self.configure_inner();
        self.configuring = false;
        result
    }

    fn configure_inner(&mut self) -> LinkResult<()> {
        if !self.begun {
            return Err(self.record(LinkError::NotConfigured));
        }

        // 1. ChangeState, no ACK expected. A dead master write usually
        //    means the clock is asleep: ping the wake-up alias and try
        //    once more.
        let change = frame::change_state(STATE_RUN);
        if self.bus.master_write(ADDR_CLOCK, &change).is_err() {
            self.record(LinkError::I2cComm);
            info!("link: clock unresponsive, trying wake-up ping");
            let _ = self.send_ping();
            if self.bus.master_write(ADDR_CLOCK, &change).is_err() {
                warn!("link: clock still unresponsive after wake-up");
                self.rx.set_connected(false);
                self.rx.set_configured(false);
                return Err(self.record(LinkError::ClockOff));
            }
        }

        // 2. Claim central control, 3. confirm the state — both acked.
        let set_cc = frame::set_central_control();
        self.send(
            "setCentralControl",
            &set_cc,
            ADDR_LISTEN_ACK,
            CMD_SET_CENTRAL_CONTROL,
            1,
            ADDR_CLOCK,
            true,
        )?;

        let change = frame::change_state(STATE_RUN);
        self.send(
            "changeState",
            &change,
            ADDR_LISTEN_ACK,
            CMD_CHANGE_STATE,
            1,
            ADDR_CLOCK,
            true,
        )?;

        // 4. Zero both timers, stopped.
        let zeros = frame::set_and_run(&ClockTime::default(), ClockMode::Stop, ClockMode::Stop);
        self.send(
            "setAndRun",
            &zeros,
            ADDR_LISTEN_DATA,
            0,
            0,
            ADDR_CLOCK,
            true,
        )?;

        self.rx.set_connected(true);
        self.rx.set_configured(true);
        info!("link: configured, central control granted");
        Ok(())
    }

    // ── Commands ──────────────────────────────────────────────

    /// Send a ChangeState with an explicit state byte and await its ACK.
    pub fn change_state(&mut self, state: u8) -> LinkResult<()> {
        let f = frame::change_state(state);
        self.send(
            "changeState",
            &f,
            ADDR_LISTEN_ACK,
            CMD_CHANGE_STATE,
            1,
            ADDR_CLOCK,
            true,
        )
    }

    /// Show up to 11 characters on the display, optionally beeping and
    /// lighting the per-side dot segments.
    pub fn display_text(
        &mut self,
        text: &str,
        beep: u8,
        left_dots: u8,
        right_dots: u8,
    ) -> LinkResult<()> {
        if text.len() > DISPLAY_TEXT_LEN
            || beep > MAX_BEEP
            || left_dots & !LEFT_DOTS_MASK != 0
            || right_dots & !RIGHT_DOTS_MASK != 0
        {
            return Err(LinkError::InvalidParam);
        }
        let f = frame::display(text, beep, left_dots, right_dots);
        self.send(
            "display",
            &f,
            ADDR_LISTEN_ACK,
            CMD_DISPLAY,
            1,
            ADDR_CLOCK,
            true,
        )
    }

    /// Clear the text display. No ACK wait — see the module docs.
    pub fn end_display(&mut self) -> LinkResult<()> {
        let f = frame::end_display();
        self.send(
            "endDisplay",
            &f,
            ADDR_LISTEN_DATA,
            0,
            0,
            ADDR_CLOCK,
            true,
        )
    }

    /// Load both timers and set the per-side modes. No ACK wait.
    pub fn set_and_run(
        &mut self,
        time: &ClockTime,
        left: ClockMode,
        right: ClockMode,
    ) -> LinkResult<()> {
        if !time.is_valid() {
            return Err(LinkError::InvalidParam);
        }
        let f = frame::set_and_run(time, left, right);
        self.send(
            "setAndRun",
            &f,
            ADDR_LISTEN_DATA,
            0,
            0,
            ADDR_CLOCK,
            true,
        )
    }

    /// Halt both timers, preserving the displayed time.
    pub fn stop(&mut self) -> LinkResult<()> {
        let snapshot = self.rx.time_snapshot();
        self.set_and_run(&snapshot, ClockMode::Stop, ClockMode::Stop)
    }

    /// Resume counting from the current snapshot.
    pub fn run(&mut self, left: ClockMode, right: ClockMode) -> LinkResult<()> {
        let snapshot = self.rx.time_snapshot();
        self.set_and_run(&snapshot, left, right)
    }

    /// Ask the clock to power down and drop back to Initialized.
    pub fn power_off(&mut self) -> LinkResult<()> {
        let f = frame::change_state(STATE_OFF);
        let result = self.send(
            "powerOff",
            &f,
            ADDR_LISTEN_DATA,
            0,
            0,
            ADDR_CLOCK,
            true,
        );
        self.rx.set_connected(false);
        self.rx.set_configured(false);
        info!("link: powered off");
        result
    }

    // ── Inbound accessors ─────────────────────────────────────

    /// Drain pending slave bytes (loop-tick hook).
    pub fn poll(&mut self) {
        self.bus.poll_inbound(&self.rx);
    }

    /// Last stored time snapshot.
    pub fn get_time(&self) -> ClockTime {
        self.rx.time_snapshot()
    }

    /// Consume the new-time flag; `Some` when a fresh tick arrived.
    pub fn take_new_time(&self) -> Option<ClockTime> {
        self.rx.take_new_time()
    }

    /// Pop one classified button event.
    pub fn get_button_event(&self) -> Option<u8> {
        self.rx.pop_button_event()
    }

    /// Current raw button mask.
    pub fn get_button_state(&self) -> u8 {
        self.rx.button_state()
    }

    // ── Errors ────────────────────────────────────────────────

    pub fn last_error(&self) -> Option<LinkError> {
        self.last_error
    }

    pub fn error_string(&self) -> String {
        self.last_error
            .map_or_else(|| "ok".to_owned(), |e| e.to_string())
    }

    fn record(&mut self, e: LinkError) -> LinkError {
        self.last_error = Some(e);
        e
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
