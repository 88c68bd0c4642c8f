//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeController (domain)
//! ```
//!
//! Driven adapters (sensor array, LoRaWAN radio, NVS, watchdog/reset,
//! event sinks) implement these traits. The
//! [`NodeController`](super::controller::NodeController) owns one of each,
//! bundled by a [`Platform`], so the domain core never touches hardware
//! directly.

use embedded_hal::delay::DelayNs;

use crate::config::{NodeConfig, RadioSettings};
use crate::error::{RadioError, SensorError};
use crate::events::RadioEvents;
use crate::fault::RestartReason;
use crate::sensors::{BaselinePair, Co2Reading, IaqReading, PmReading};

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

/// Names the concrete adapter for every port. One implementation per
/// target (device, host simulation, test harness).
pub trait Platform {
    type Sensors: SensorPort;
    type Radio: RadioPort;
    type Store: ConfigPort + StoragePort;
    type System: SystemPort;
    type Delay: DelayNs;
    type Sink: EventSink;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// The three air-quality sensors on a shared bus.
pub trait SensorPort {
    /// Put every sensor into measurement mode. Continues past individual
    /// failures and reports the first one.
    fn start(&mut self, delay: &mut impl DelayNs) -> Result<(), SensorError>;

    /// Number of devices acknowledging on the sensor bus.
    fn responding_devices(&mut self) -> usize;

    /// Force the VOC/eCO2 sensor's baseline.
    fn set_iaq_baseline(&mut self, baseline: BaselinePair) -> Result<(), SensorError>;

    /// Read back the VOC/eCO2 sensor's current baseline.
    fn iaq_baseline(&mut self) -> Result<BaselinePair, SensorError>;

    /// tVOC and eCO2 indices.
    fn read_iaq(&mut self) -> Result<IaqReading, SensorError>;

    /// CO2, temperature and humidity. Channels not yet available are NaN.
    fn read_co2(&mut self) -> Result<Co2Reading, SensorError>;

    /// PM1 / PM2.5 / PM4 / PM10 mass concentrations.
    fn read_particulates(&mut self) -> Result<PmReading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain ↔ LoRaWAN stack)
// ───────────────────────────────────────────────────────────────

/// Largest downlink accepted from the socket.
pub const MAX_DOWNLINK_LEN: usize = 256;

/// OTAA join parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    pub dev_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
    pub data_rate: u8,
}

/// A datagram received in the downlink window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// LoRaWAN FPort the frame arrived on.
    pub port: u8,
    pub data: heapless::Vec<u8, MAX_DOWNLINK_LEN>,
}

/// Link-quality counters reported by the stack after a transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStats {
    pub rssi_dbm: i16,
    pub snr_db: f32,
    pub data_rate: u8,
    pub tx_counter: u32,
}

/// The LoRaWAN link. Join, MAC and retransmission live behind this trait.
pub trait RadioPort {
    /// Bring up the LoRaWAN stack with the static radio settings.
    fn init(&mut self, settings: &RadioSettings) -> Result<(), RadioError>;

    /// The radio's own DevEUI.
    fn device_eui(&self) -> [u8; 8];

    /// Issue an OTAA join. Completion is observed through [`has_joined`].
    ///
    /// [`has_joined`]: RadioPort::has_joined
    fn join(&mut self, request: &JoinRequest) -> Result<(), RadioError>;

    /// Whether the join handshake has completed.
    fn has_joined(&mut self) -> bool;

    /// Open the raw LoRa socket with the given data rate and confirmation mode.
    fn open_socket(&mut self, data_rate: u8, confirmed: bool) -> Result<(), RadioError>;

    /// Register the channel that transmit/receive notifications are posted to.
    fn subscribe(&mut self, events: &'static RadioEvents);

    /// Queue an uplink.
    fn send(&mut self, payload: &[u8]) -> Result<(), RadioError>;

    /// Non-blocking poll for one downlink.
    fn receive(&mut self) -> Result<Option<Downlink>, RadioError>;

    /// Latest link statistics, if the stack keeps any.
    fn stats(&self) -> Option<LinkStats> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the runtime-mutable node configuration.
///
/// Implementations MUST validate before persisting: an out-of-range
/// interval is rejected with [`ConfigError::ValidationFailed`], never
/// clamped.
pub trait ConfigPort {
    /// Load configuration. A missing interval is seeded with the default;
    /// an invalid one falls back to the default without being rewritten.
    fn load(&mut self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist a new measurement interval.
    fn save_interval(&mut self, secs: u16) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage. Keys are namespaced to prevent
/// collisions between subsystems. Writes MUST be atomic.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`, or
    /// `BufferTooSmall` if the stored value does not fit.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → watchdog / reset / clock)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Arm the hardware watchdog. Called once per boot.
    fn arm_watchdog(&mut self, timeout_ms: u32);

    /// Reset the watchdog countdown.
    fn feed_watchdog(&mut self);

    /// Hard device restart. Does not return on real hardware.
    fn restart(&mut self, reason: RestartReason);

    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`NodeEvent`](super::events::NodeEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::NodeEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage failed.
    Storage(StorageError),
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// The stored value is longer than the read buffer.
    BufferTooSmall,
    /// Generic I/O error.
    IoError,
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::BufferTooSmall => write!(f, "value larger than buffer"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
