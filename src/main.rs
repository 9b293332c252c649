//! DGT3000 BLE Gateway — Main Entry Point
//!
//! Two execution contexts share three queues and a handful of lock-free
//! flags; nothing else crosses the core boundary.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ Core 0 (PRO)                       Core 1 (APP)                │
//! │                                                                │
//! │  BLE loop (this thread)             ClockTask (pinned, pri 20) │
//! │  BleAdapter · StatusRegistry        ClockLink · EspClockBus    │
//! │        │                                  ▲                    │
//! │        │  raw commands (10) ─────────────▶│                    │
//! │        │◀───────── events (20, priority)  │                    │
//! │        │◀───────── responses (10)         │                    │
//! │        │                                  │                    │
//! │  BleSignals (connect/subscribe) ─────────▶│                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::info;

use dgtbridge::adapters::ble::{BleAdapter, BleSignals};
use dgtbridge::adapters::time::TimeAdapter;
use dgtbridge::app::StatusRegistry;
use dgtbridge::config::GatewayConfig;
use dgtbridge::drivers::task_pin::{self, Core};
use dgtbridge::link::{ClockLink, RxShared};
use dgtbridge::task::ClockTask;
use dgtbridge::transport::QueueHub;

/// BLE loop period: drain queues, pump notifications, refresh status.
const BLE_LOOP_PERIOD_MS: u64 = 20;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  DGT Bridge v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = GatewayConfig::default();

    // ── 2. Shared state ───────────────────────────────────────
    let queues = QueueHub::new(&config);
    let signals = Arc::new(BleSignals::new());
    let status = Arc::new(StatusRegistry::new());
    let rx = Arc::new(RxShared::new());

    // ── 3. Clock task on the app core ─────────────────────────
    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let bus = dgtbridge::adapters::i2c::EspClockBus::new(
        peripherals.i2c0,
        peripherals.pins.gpio21.into(),
        peripherals.pins.gpio22.into(),
        config.slave_settle_ms,
    )
    .map_err(|e| anyhow::anyhow!("I2C bring-up failed: {e}"))?;

    let link = ClockLink::new(bus, Arc::clone(&rx), config.clone());
    let mut clock_task = ClockTask::new(
        link,
        Arc::clone(&queues),
        Arc::clone(&signals),
        Arc::clone(&status),
        config.clone(),
    );

    task_pin::spawn_on_core(
        Core::App,
        task_pin::CLOCK_TASK_PRIORITY,
        task_pin::CLOCK_TASK_STACK_KB,
        "clock-task\0",
        move || clock_task.run(),
    );

    // ── 4. BLE adapter on this core ───────────────────────────
    let mut ble = BleAdapter::new(
        config.device_name.clone(),
        Arc::clone(&signals),
        Arc::clone(&queues),
        config.status_refresh_ms,
    );
    ble.start();

    info!("System ready. Entering BLE loop.");

    // ── 5. BLE loop ───────────────────────────────────────────
    let time = TimeAdapter::new();
    loop {
        let now_ms = time.uptime_ms();

        ble.pump_notifications(&status);

        ble.refresh_status(now_ms, false, || {
            let snap = status.snapshot(
                now_ms,
                free_heap(),
                queues.depths(),
                rx.is_connected(),
                rx.is_configured(),
                signals.is_connected(),
            );
            serde_json::Value::Object(snap).to_string()
        });

        std::thread::sleep(Duration::from_millis(BLE_LOOP_PERIOD_MS));
    }
}

fn free_heap() -> u32 {
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}
