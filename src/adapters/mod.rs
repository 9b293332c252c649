//! Adapters — the platform edge of the gateway.
//!
//! | Adapter | Implements           | Connects to                 |
//! |---------|----------------------|-----------------------------|
//! | `ble`   | GATT surface         | Bluedroid GATT server       |
//! | `i2c`   | `ClockBus`           | ESP32-S3 I2C0 / I2C1        |
//! | `time`  | monotonic timestamps | ESP high-resolution timer   |
//!
//! Each adapter keeps its protocol logic target-independent and gates
//! the ESP-IDF wiring behind `#[cfg(target_os = "espidf")]`, so the
//! whole crate builds and tests on the host.

pub mod ble;
pub mod i2c;
pub mod time;
