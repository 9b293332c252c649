//! CRC-8-ATM framing checksum.
//!
//! The DGT3000 checksums every frame with CRC-8-ATM (polynomial
//! `x^8 + x^2 + x + 1`, init 0, no reflection) — the parameter set the
//! `crc` crate ships as `CRC_8_SMBUS`. The quirk is that the checksum
//! covers the I2C destination address byte `0x10` in front of the frame.
//! Outbound frames never transmit that byte, so [`compute`] seeds it;
//! inbound frames carry it in-band as `buf[0]`, so [`verify_inbound`]
//! runs over the received bytes as-is. (The fixed wake-up response
//! `10 07 02 22 01 05` only validates under the in-band rule.)

use crc::{CRC_8_SMBUS, Crc};

/// Destination address byte consumed by the CRC ahead of outbound frames.
const CRC_SEED_ADDR: u8 = 0x10;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Compute the CRC of an outbound frame: seed with the address byte,
/// then every frame byte except the trailing CRC slot.
pub fn compute(frame: &[u8]) -> u8 {
    debug_assert!(frame.len() >= 2, "frame too short for a CRC slot");
    let mut digest = CRC8.digest();
    digest.update(&[CRC_SEED_ADDR]);
    digest.update(&frame[..frame.len() - 1]);
    digest.finalize()
}

/// Write the CRC into the last byte of an outbound `frame`.
pub fn fill(frame: &mut [u8]) {
    let crc = compute(frame);
    let last = frame.len() - 1;
    frame[last] = crc;
}

/// Validate an outbound-style frame (address byte seeded, not present).
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    compute(frame) == frame[frame.len() - 1]
}

/// Validate an inbound frame as received on the slave bus. `buf[0]` is
/// the in-band address byte, the last byte is the CRC over everything
/// before it.
pub fn verify_inbound(buf: &[u8]) -> bool {
    if buf.len() < 3 {
        return false;
    }
    CRC8.checksum(&buf[..buf.len() - 1]) == buf[buf.len() - 1]
}

/// CRC an inbound-style frame into its last byte (test scaffolding for
/// synthesising clock traffic).
pub fn fill_inbound(buf: &mut [u8]) {
    let last = buf.len() - 1;
    buf[last] = CRC8.checksum(&buf[..last]);
}
