//! BLE GATT adapter.
//!
//! The gateway's client-facing surface: one primary service with four
//! characteristics. Pure protocol logic (validation, serialization,
//! pacing) lives here and runs on every target; the Bluedroid stack
//! wiring is gated behind `target_os = "espidf"`.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID              | Perms        |
//! |----------------|-------------------|--------------|
//! | Version        | `…97cb0001`       | Read         |
//! | Command        | `…97cb0002`       | Write        |
//! | Event          | `…97cb0003`       | Notify+CCCD  |
//! | Status         | `…97cb0004`       | Read         |
//!
//! The adapter never talks to the clock task directly: commands go
//! through the raw-command queue, lifecycle edges through the lock-free
//! [`BleSignals`] flags the task polls (this breaks the adapter↔task
//! reference cycle).

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::app::{MAX_CMD_BYTES, RawCommand};
use crate::transport::QueueHub;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x73822f6e_edcd_44bb_974b_93ee97cb0000;
pub const CHAR_VERSION: u128 = 0x73822f6e_edcd_44bb_974b_93ee97cb0001;
pub const CHAR_COMMAND: u128 = 0x73822f6e_edcd_44bb_974b_93ee97cb0002;
pub const CHAR_EVENT: u128 = 0x73822f6e_edcd_44bb_974b_93ee97cb0003;
pub const CHAR_STATUS: u128 = 0x73822f6e_edcd_44bb_974b_93ee97cb0004;

/// Literal value of the version characteristic.
pub const PROTOCOL_VERSION: &str = "1.0";

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    StackInitFailed,
    /// Write is empty, oversized, or not a plausible JSON object.
    InvalidPayload,
    /// The raw-command queue rejected the write.
    QueueFull,
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInitFailed => write!(f, "BLE stack initialisation failed"),
            Self::InvalidPayload => write!(f, "command write rejected"),
            Self::QueueFull => write!(f, "raw command queue full"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Lifecycle signals
// ───────────────────────────────────────────────────────────────

/// Lock-free connect/subscribe flags the clock task polls for edges.
/// Written only from the GATT callback context.
pub struct BleSignals {
    connected: AtomicBool,
    subscribed: AtomicBool,
}

impl Default for BleSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl BleSignals {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, v: bool) {
        self.connected.store(v, Ordering::Release);
        if !v {
            // A dropped connection implicitly drops the subscription.
            self.subscribed.store(false, Ordering::Release);
        }
    }

    pub fn set_subscribed(&self, v: bool) {
        self.subscribed.store(v, Ordering::Release);
    }
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// Shape check for a command write: bounded and `{…}`-delimited. Full
/// JSON parsing is the clock task's job.
fn plausible_command(raw: &[u8]) -> bool {
    !raw.is_empty()
        && raw.len() < MAX_CMD_BYTES
        && raw.first() == Some(&b'{')
        && raw.last() == Some(&b'}')
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    signals: Arc<BleSignals>,
    queues: Arc<QueueHub>,
    /// Cached status characteristic payload.
    status_payload: String,
    last_status_refresh_ms: u64,
    status_refresh_ms: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_sent: Vec<String>,
}

impl BleAdapter {
    pub fn new(
        device_name: heapless::String<24>,
        signals: Arc<BleSignals>,
        queues: Arc<QueueHub>,
        status_refresh_ms: u32,
    ) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            signals,
            queues,
            status_payload: String::new(),
            last_status_refresh_ms: 0,
            status_refresh_ms,
            #[cfg(not(target_os = "espidf"))]
            sim_sent: Vec::new(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self) {
        info!("BLE: advertising as '{}'", self.device_name);
        self.platform_start();
        self.state = BleState::Advertising;
    }

    pub fn stop(&mut self) {
        self.platform_stop();
        self.state = BleState::Idle;
        self.signals.set_connected(false);
        info!("BLE: stopped");
    }

    // ── GATT callbacks ────────────────────────────────────────

    pub fn on_central_connected(&mut self) {
        info!("BLE: central connected");
        self.state = BleState::Connected;
        self.signals.set_connected(true);
    }

    pub fn on_central_disconnected(&mut self) {
        info!("BLE: central disconnected");
        if self.state != BleState::Idle {
            self.state = BleState::Advertising;
        }
        self.signals.set_connected(false);
    }

    /// CCCD write on the event characteristic.
    pub fn on_event_subscription(&mut self, subscribed: bool) {
        info!("BLE: event notifications {}", if subscribed { "on" } else { "off" });
        self.signals.set_subscribed(subscribed);
    }

    /// Write to the command characteristic. Validated payloads become
    /// [`RawCommand`]s on the raw queue; the queue owns them from here.
    pub fn on_command_write(&mut self, raw: &[u8], now_ms: u64) -> Result<(), BleError> {
        if !plausible_command(raw) {
            warn!("BLE: implausible command write ({} bytes), dropped", raw.len());
            return Err(BleError::InvalidPayload);
        }
        let cmd = RawCommand::new(now_ms, raw).ok_or(BleError::InvalidPayload)?;
        if self.queues.raw_commands.send(cmd, 0) {
            debug!("BLE: command queued ({} bytes)", raw.len());
            Ok(())
        } else {
            warn!("BLE: raw command queue full, write dropped");
            Err(BleError::QueueFull)
        }
    }

    /// Read of the version characteristic.
    pub fn read_version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    // ── Notification pump ─────────────────────────────────────

    /// Drain pending responses and events into notifications. Called
    /// from the main loop; must not block. Returns the number sent.
    pub fn pump_notifications(&mut self, status: &crate::app::StatusRegistry) -> usize {
        let mut sent = 0;

        while let Some(resp) = self.queues.responses.recv(0) {
            self.notify(&resp.to_json().to_string());
            status.count_notification();
            sent += 1;
        }

        while let Some(ev) = self.queues.events.recv(0) {
            self.notify(&ev.to_json().to_string());
            self.queues.stats.note_event_processed();
            status.count_notification();
            sent += 1;
        }

        sent
    }

    // ── Status characteristic ─────────────────────────────────

    /// Refresh the cached status payload at most once per interval, or
    /// immediately when `force` (explicit client read).
    pub fn refresh_status(&mut self, now_ms: u64, force: bool, snapshot: impl FnOnce() -> String) {
        let due = now_ms.saturating_sub(self.last_status_refresh_ms)
            >= u64::from(self.status_refresh_ms);
        if !force && !due && !self.status_payload.is_empty() {
            return;
        }
        self.last_status_refresh_ms = now_ms;
        self.status_payload = snapshot();
        self.platform_update_status();
    }

    /// Current status characteristic value.
    pub fn read_status(&self) -> &str {
        &self.status_payload
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) {
        // ESP-IDF: BtDriver + EspBleGap + EspGatts initialization.
        //
        // The wiring follows the bt_gatt_server example from esp-idf-svc:
        //
        // 1. BtDriver::new(peripherals.modem, nvs)
        // 2. EspBleGap::new(bt.clone()) → subscribe gap events
        // 3. EspGatts::new(bt.clone()) → subscribe gatts events
        // 4. Register app (APP_ID = 0)
        // 5. On GattsEvent::ServiceRegistered → create SERVICE_UUID
        // 6. On GattsEvent::ServiceCreated → add the four characteristics
        //    (version: read, command: write, event: notify + CCCD,
        //    status: read)
        // 7. On CharacteristicAdded → store the attribute handles
        // 8. On write events → on_command_write / on_event_subscription
        // 9. On connect/disconnect → on_central_{connected,disconnected}
        //
        // The Bluedroid stack needs these sdkconfig settings:
        //   CONFIG_BT_ENABLED=y
        //   CONFIG_BT_BLUEDROID_ENABLED=y
        //   CONFIG_BT_CLASSIC_ENABLED=n
        //   CONFIG_BTDM_CTRL_MODE_BLE_ONLY=y
        info!("BLE(espidf): GATT server up, service {:032x}", SERVICE_UUID);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) {
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        // Stop advertising, drop the GATT registration, deinit BtDriver.
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn notify(&mut self, _payload: &str) {
        // gatts.indicate(gatt_if, conn_id, event_handle, payload) for
        // every subscribed central.
    }

    #[cfg(not(target_os = "espidf"))]
    fn notify(&mut self, payload: &str) {
        debug!("BLE(sim): notify {}", payload);
        self.sim_sent.push(payload.to_owned());
    }

    #[cfg(target_os = "espidf")]
    fn platform_update_status(&mut self) {
        // gatts.set_attr(status_handle, self.status_payload.as_bytes())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_update_status(&mut self) {
        debug!("BLE(sim): status = {}", self.status_payload);
    }

    /// Notifications captured by the simulation backend (tests only).
    #[cfg(not(target_os = "espidf"))]
    pub fn take_sent(&mut self) -> Vec<String> {
        core::mem::take(&mut self.sim_sent)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
