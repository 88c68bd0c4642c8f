//! Node configuration parameters
//!
//! Only the measurement interval is runtime-mutable (persisted in NVS and
//! changed over the air). Jitter, radio settings, OTAA keys and the debug
//! flag are fixed at build time.

use serde::{Deserialize, Serialize};

// --- Measurement interval ---

/// Interval used when NVS holds nothing valid.
pub const DEFAULT_MEAS_INTERVAL_SECS: u16 = 120;

/// Range accepted when reading the persisted interval at boot (30 s – 20 min).
pub const BOOT_INTERVAL_RANGE: core::ops::RangeInclusive<u16> = 30..=1200;

/// Range accepted by the SET_INTERVAL downlink (30 s – 30 min).
///
/// Wider than [`BOOT_INTERVAL_RANGE`]: a value in 1201..=1800 is persisted
/// but replaced by the default on the next boot.
pub const RUNTIME_INTERVAL_RANGE: core::ops::RangeInclusive<u16> = 30..=1800;

/// Watchdog slack added on top of one measurement interval (seconds).
pub const WATCHDOG_GRACE_SECS: u32 = 30;

// --- Radio ---

/// LoRaWAN regional plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Eu868,
}

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    A,
    C,
}

/// Static radio settings (EU868).
///
/// ```text
/// DR  SF    BW(kHz)  bit/s   max payload
/// 0   SF12  125      250     51
/// 3   SF9   125      1760    115
/// 5   SF7   125      5470    242
/// 6   SF7   250      11000   242
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSettings {
    pub region: Region,
    pub frequency_hz: u32,
    pub data_rate: u8,
    pub device_class: DeviceClass,
    pub adaptive_data_rate: bool,
    pub public_network: bool,
    pub tx_retries: u8,
    pub confirmed_uplinks: bool,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            region: Region::Eu868,
            frequency_hz: 868_100_000,
            data_rate: 5,
            device_class: DeviceClass::C,
            adaptive_data_rate: false,
            public_network: true,
            tx_retries: 1,
            confirmed_uplinks: true,
        }
    }
}

/// OTAA application credentials. The DevEUI comes from the radio itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaaKeys {
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
}

/// Provisioned per fleet at build time.
pub const APP_EUI: [u8; 8] = [0x00; 8];
pub const APP_KEY: [u8; 16] = [0x00; 16];

impl Default for OtaaKeys {
    fn default() -> Self {
        Self {
            app_eui: APP_EUI,
            app_key: APP_KEY,
        }
    }
}

// --- Node ---

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Seconds between measurement cycles.
    pub measurement_interval_secs: u16,
    /// Startup delay so that nodes powered together do not collide on air.
    /// Must differ per device; set with `IAQNODE_JITTER_MS` at build time.
    pub jitter_ms: u32,
    /// Emit operational log lines.
    pub debug: bool,
    pub radio: RadioSettings,
    pub keys: OtaaKeys,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            measurement_interval_secs: DEFAULT_MEAS_INTERVAL_SECS,
            jitter_ms: build_time_jitter_ms(),
            debug: true,
            radio: RadioSettings::default(),
            keys: OtaaKeys::default(),
        }
    }
}

impl NodeConfig {
    /// Watchdog timeout in seconds. Always longer than one interval plus
    /// [`WATCHDOG_GRACE_SECS`], so a healthy cycle can never trip it.
    pub fn watchdog_timeout_secs(&self) -> u32 {
        watchdog_timeout_secs(self.measurement_interval_secs)
    }
}

/// Watchdog timeout for a given interval: one interval of slack on top of
/// the interval itself, plus the fixed grace period.
pub fn watchdog_timeout_secs(interval_secs: u16) -> u32 {
    let interval = u32::from(interval_secs);
    interval + interval + WATCHDOG_GRACE_SECS
}

fn build_time_jitter_ms() -> u32 {
    option_env!("IAQNODE_JITTER_MS")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}
