//! Unified error types for the IAQ node firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level error handling uniform. All variants are `Copy` so they can be
//! passed through the controller and logged without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible port operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned unusable data.
    Sensor(SensorError),
    /// The LoRaWAN link reported a failure.
    Radio(RadioError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The device did not acknowledge on the bus.
    NotResponding,
    /// A bus transfer failed mid-transaction.
    BusError,
    /// The driver reported a CRC or framing error in the reply.
    InvalidReply,
    /// The sensor has no new measurement yet.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotResponding => write!(f, "device not responding"),
            Self::BusError => write!(f, "bus transfer failed"),
            Self::InvalidReply => write!(f, "invalid reply"),
            Self::NotReady => write!(f, "measurement not ready"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// The join request could not be issued.
    JoinFailed,
    /// The LoRa socket could not be opened or configured.
    SocketFailed,
    /// The uplink was rejected by the MAC layer.
    SendFailed,
    /// Reading the receive queue failed.
    ReceiveFailed,
    /// Operation requires a joined session.
    NotJoined,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JoinFailed => write!(f, "join request failed"),
            Self::SocketFailed => write!(f, "socket setup failed"),
            Self::SendFailed => write!(f, "uplink send failed"),
            Self::ReceiveFailed => write!(f, "downlink receive failed"),
            Self::NotJoined => write!(f, "not joined"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<crate::app::ports::ConfigError> for Error {
    fn from(e: crate::app::ports::ConfigError) -> Self {
        use crate::app::ports::ConfigError;
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::Storage(_) => Self::Config("storage failure"),
        }
    }
}
