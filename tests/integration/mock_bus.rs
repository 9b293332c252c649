//! Scripted mock bus for integration tests.
//!
//! Plays the role of both I2C peripherals *and* the clock on the other
//! end: master writes are recorded, and the scripted clock reacts by
//! dispatching inbound frames into the shared receive state exactly as
//! the slave path would.

use std::sync::Arc;

use dgtbridge::error::{LinkError, LinkResult};
use dgtbridge::link::bus::ClockBus;
use dgtbridge::link::rx::{self, RxShared};
use dgtbridge::link::frame;

/// One recorded master transmission.
#[derive(Debug, Clone)]
pub struct Write {
    pub addr: u8,
    pub frame: Vec<u8>,
}

pub struct MockBus {
    pub rx: Arc<RxShared>,
    pub writes: Vec<Write>,
    pub listen: u8,
    /// Count of listen-address rebinds (switch discipline assertions).
    pub rebinds: usize,
    /// Master writes that fail before traffic flows again.
    pub fail_writes: u32,
    /// Acknowledge ACK-expecting commands automatically.
    pub auto_ack: bool,
    /// Answer wake-up pings with the fixed response.
    pub answer_ping: bool,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new(rx: Arc<RxShared>) -> Self {
        Self {
            rx,
            writes: Vec::new(),
            listen: 0xFF,
            rebinds: 0,
            fail_writes: 0,
            auto_ack: true,
            answer_ping: false,
        }
    }

    /// Command codes of every recorded write, in order.
    pub fn codes(&self) -> Vec<u8> {
        self.writes.iter().map(|w| w.frame[2]).collect()
    }

    pub fn last_frame(&self) -> &[u8] {
        &self.writes.last().expect("no writes recorded").frame
    }

    /// Simulate the clock spontaneously reporting a time tick.
    pub fn inject_time(&self, time: &dgtbridge::app::ClockTime) {
        rx::dispatch_frame(&self.rx, &rx::make_time_frame(time, false));
    }

    /// Simulate a button state transition frame.
    pub fn inject_button(&self, current: u8, previous: u8) {
        rx::dispatch_frame(&self.rx, &rx::make_button_frame(current, previous));
    }
}

impl ClockBus for MockBus {
    fn master_write(&mut self, addr: u8, frame_bytes: &[u8]) -> LinkResult<()> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(LinkError::I2cComm);
        }
        self.writes.push(Write {
            addr,
            frame: frame_bytes.to_vec(),
        });

        if addr == frame::ADDR_WAKEUP {
            if self.answer_ping {
                rx::dispatch_frame(&self.rx, &frame::PING_RESPONSE);
            }
        } else if self.auto_ack && self.listen == frame::ADDR_LISTEN_ACK {
            rx::dispatch_frame(&self.rx, &rx::make_ack_frame(frame_bytes[2]));
        }
        Ok(())
    }

    fn set_listen_addr(&mut self, addr: u8) -> LinkResult<()> {
        if addr != self.listen {
            self.rebinds += 1;
            self.listen = addr;
        }
        Ok(())
    }

    fn listen_addr(&self) -> u8 {
        self.listen
    }

    fn poll_inbound(&mut self, _rx: &RxShared) {}
}
