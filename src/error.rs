//! Unified error types for the gateway firmware.
//!
//! Two layers mirror the two protocol domains: [`LinkError`] covers the
//! I2C transport faults the DGT3000 link layer can hit, and
//! [`SystemErrorCode`] is the stable `u16` code set the BLE protocol
//! exposes to clients. All link variants are `Copy` so they can be
//! cheaply recorded, re-read, and translated without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Link transport errors
// ---------------------------------------------------------------------------

/// Faults the DGT3000 link layer can encounter on the dual I2C bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// I2C peripheral (re-)initialisation failed.
    I2cInit,
    /// A master-bus write to the clock failed.
    I2cComm,
    /// An expected response did not arrive within its window.
    Timeout,
    /// The clock never acknowledged a command that requires an ACK.
    NoAck,
    /// An inbound frame failed CRC validation.
    Crc,
    /// An inbound frame exceeded the receive buffer.
    BufferOverrun,
    /// The clock appears to be powered off (wake-up ping unanswered).
    ClockOff,
    /// An operation was attempted before the configure sequence ran.
    NotConfigured,
    /// A command parameter is outside the clock's accepted range.
    InvalidParam,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2cInit => write!(f, "I2C init failed"),
            Self::I2cComm => write!(f, "I2C communication failed"),
            Self::Timeout => write!(f, "response timeout"),
            Self::NoAck => write!(f, "no ACK from clock"),
            Self::Crc => write!(f, "CRC mismatch"),
            Self::BufferOverrun => write!(f, "receive buffer overrun"),
            Self::ClockOff => write!(f, "clock is off"),
            Self::NotConfigured => write!(f, "clock not configured"),
            Self::InvalidParam => write!(f, "parameter out of range"),
        }
    }
}

/// Link-layer `Result` alias.
pub type LinkResult<T> = core::result::Result<T, LinkError>;

// ---------------------------------------------------------------------------
// Wire-visible error codes
// ---------------------------------------------------------------------------

/// Error codes surfaced to BLE clients in `command_response` and `error`
/// payloads. Numeric values are part of the wire protocol and must stay
/// stable within a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SystemErrorCode {
    Success = 0,
    I2cCommunicationError = 1,
    DgtNotConfigured = 2,
    I2cCrcError = 3,
    DgtNotConnected = 4,
    JsonParseError = 5,
    JsonInvalidCommand = 6,
    JsonInvalidParameters = 7,
    CommandTimeout = 8,
    UnknownError = 9,
}

impl SystemErrorCode {
    /// The `u16` value transmitted in JSON payloads.
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for SystemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::I2cCommunicationError => write!(f, "I2C communication error"),
            Self::DgtNotConfigured => write!(f, "clock not configured"),
            Self::I2cCrcError => write!(f, "I2C CRC error"),
            Self::DgtNotConnected => write!(f, "clock not connected"),
            Self::JsonParseError => write!(f, "JSON parse error"),
            Self::JsonInvalidCommand => write!(f, "invalid command"),
            Self::JsonInvalidParameters => write!(f, "invalid parameters"),
            Self::CommandTimeout => write!(f, "command timeout"),
            Self::UnknownError => write!(f, "unknown error"),
        }
    }
}

/// Translation from link transport faults to wire codes.
///
/// Timeouts and missing ACKs both surface as `CommandTimeout`: from the
/// client's perspective the command simply never completed.
impl From<LinkError> for SystemErrorCode {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::I2cInit | LinkError::I2cComm => Self::I2cCommunicationError,
            LinkError::Timeout | LinkError::NoAck => Self::CommandTimeout,
            LinkError::NotConfigured => Self::DgtNotConfigured,
            LinkError::Crc => Self::I2cCrcError,
            LinkError::ClockOff => Self::DgtNotConnected,
            LinkError::InvalidParam => Self::JsonInvalidParameters,
            LinkError::BufferOverrun => Self::UnknownError,
        }
    }
}
