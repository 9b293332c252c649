//! Dual-bus I2C adapter for the DGT3000.
//!
//! Implements [`ClockBus`] on the ESP32-S3: I2C0 as the 100 kHz master
//! the gateway commands on, I2C1 as the slave the clock answers to.
//! The clock addresses replies to one of two slave addresses, so
//! [`set_listen_addr`](ClockBus::set_listen_addr) literally tears the
//! slave driver down and re-creates it on the other address, followed
//! by the settle delay the clock needs before it will talk again.
//!
//! On non-ESP targets a no-op simulation bus stands in so the library
//! (and its tests, which bring their own scripted buses) builds on the
//! host.

use log::debug;

use crate::error::LinkResult;
use crate::link::bus::ClockBus;
use crate::link::rx::RxShared;

/// Both buses run at the clock's fixed rate.
pub const BUS_FREQ_HZ: u32 = 100_000;

/// Largest inbound frame we accept from the slave FIFO.
const RX_BUF_LEN: usize = 32;

// Pin assignment for the two buses.
pub const MASTER_SDA_GPIO: i32 = 21;
pub const MASTER_SCL_GPIO: i32 = 22;
pub const SLAVE_SDA_GPIO: i32 = 18;
pub const SLAVE_SCL_GPIO: i32 = 19;

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use super::*;
    use esp_idf_hal::delay::BLOCK;
    use log::warn;

    use crate::error::LinkError;
    use crate::link::rx;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver, I2cSlaveConfig, I2cSlaveDriver};
    use esp_idf_hal::units::Hertz;

    /// Owns both peripherals. The slave driver is re-created on every
    /// listen-address change.
    pub struct EspClockBus {
        master: I2cDriver<'static>,
        slave: Option<I2cSlaveDriver<'static>>,
        listen_addr: u8,
        settle_ms: u32,
        rx_buf: [u8; RX_BUF_LEN],
    }

    impl EspClockBus {
        /// Bring up the master bus; the slave comes up on the first
        /// `set_listen_addr`.
        pub fn new(
            i2c0: esp_idf_hal::i2c::I2C0,
            sda: esp_idf_hal::gpio::AnyIOPin,
            scl: esp_idf_hal::gpio::AnyIOPin,
            settle_ms: u32,
        ) -> LinkResult<Self> {
            let config = I2cConfig::new().baudrate(Hertz(BUS_FREQ_HZ));
            let master = I2cDriver::new(i2c0, sda, scl, &config).map_err(|e| {
                warn!("i2c: master init failed ({})", e);
                LinkError::I2cInit
            })?;
            Ok(Self {
                master,
                slave: None,
                listen_addr: 0xFF,
                settle_ms,
                rx_buf: [0; RX_BUF_LEN],
            })
        }

        fn rebind_slave(&mut self, addr: u8) -> LinkResult<()> {
            // Teardown first: the peripheral cannot be re-addressed live.
            self.slave = None;
            std::thread::sleep(std::time::Duration::from_millis(u64::from(self.settle_ms)));

            let config = I2cSlaveConfig::new()
                .rx_buffer_length(RX_BUF_LEN * 4)
                .tx_buffer_length(RX_BUF_LEN);
            let slave = unsafe {
                I2cSlaveDriver::new(
                    esp_idf_hal::i2c::I2C1::new(),
                    esp_idf_hal::gpio::Gpio18::new(),
                    esp_idf_hal::gpio::Gpio19::new(),
                    addr,
                    &config,
                )
            }
            .map_err(|e| {
                warn!("i2c: slave rebind to 0x{:02X} failed ({})", addr, e);
                LinkError::I2cInit
            })?;
            self.slave = Some(slave);
            self.listen_addr = addr;
            debug!("i2c: slave listening on 0x{:02X}", addr);
            Ok(())
        }
    }

    impl ClockBus for EspClockBus {
        fn master_write(&mut self, addr: u8, frame: &[u8]) -> LinkResult<()> {
            self.master.write(addr, frame, BLOCK).map_err(|e| {
                debug!("i2c: master write to 0x{:02X} failed ({})", addr, e);
                LinkError::I2cComm
            })
        }

        fn set_listen_addr(&mut self, addr: u8) -> LinkResult<()> {
            if addr == self.listen_addr && self.slave.is_some() {
                return Ok(());
            }
            self.rebind_slave(addr)
        }

        fn listen_addr(&self) -> u8 {
            self.listen_addr
        }

        fn poll_inbound(&mut self, rx: &RxShared) {
            let Some(slave) = self.slave.as_mut() else {
                return;
            };
            // Drain whatever the clock pushed since the last poll; a
            // zero timeout keeps the service loop period intact.
            loop {
                let mut buf = self.rx_buf;
                match slave.read(&mut buf, 0) {
                    Ok(n) if n >= 3 => rx::dispatch_frame(rx, &buf[..n]),
                    _ => break,
                }
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspClockBus;

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Simulation bus for host builds: master writes vanish, the slave
/// never hears anything. Tests use their own scripted buses instead.
#[cfg(not(target_os = "espidf"))]
pub struct SimClockBus {
    listen_addr: u8,
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimClockBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl SimClockBus {
    pub fn new() -> Self {
        Self { listen_addr: 0xFF }
    }
}

#[cfg(not(target_os = "espidf"))]
impl ClockBus for SimClockBus {
    fn master_write(&mut self, addr: u8, frame: &[u8]) -> LinkResult<()> {
        debug!("i2c(sim): write {} bytes to 0x{:02X}", frame.len(), addr);
        Ok(())
    }

    fn set_listen_addr(&mut self, addr: u8) -> LinkResult<()> {
        debug!("i2c(sim): slave listening on 0x{:02X}", addr);
        self.listen_addr = addr;
        Ok(())
    }

    fn listen_addr(&self) -> u8 {
        self.listen_addr
    }

    fn poll_inbound(&mut self, _rx: &RxShared) {}
}
