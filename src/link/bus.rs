//! The I2C port trait between the link layer and the physical buses.
//!
//! ```text
//!   Adapter (ESP-IDF I2C / mock) ──▶ ClockBus ──▶ ClockLink
//! ```
//!
//! The DGT3000 needs two buses: a master the gateway commands on, and a
//! slave the clock writes back to. The clock addresses its replies to
//! one of two slave addresses, and the peripheral can only be bound to
//! one at a time — re-binding is a teardown/re-init cycle the adapter
//! must follow with a settle delay. The link layer owns the discipline
//! of *when* to switch; the adapter owns *how*.

use super::rx::RxShared;
use crate::error::LinkResult;

/// Hardware access the link layer needs. Implemented by the ESP-IDF
/// dual-bus adapter on target and by scripted mocks in tests.
pub trait ClockBus {
    /// Transmit one frame on the master bus to `addr` (7-bit).
    fn master_write(&mut self, addr: u8, frame: &[u8]) -> LinkResult<()>;

    /// Re-bind the slave peripheral to listen on `addr`. Implementations
    /// must tear down, re-initialise, and wait the settle delay; a call
    /// with the currently bound address is a no-op.
    fn set_listen_addr(&mut self, addr: u8) -> LinkResult<()>;

    /// The currently bound slave listen address.
    fn listen_addr(&self) -> u8;

    /// Drain any pending inbound slave bytes into the shared receive
    /// state. Called from the clock task loop and from ACK/ping waits.
    fn poll_inbound(&mut self, rx: &RxShared);
}
