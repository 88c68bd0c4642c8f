//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements               | Connects to                   |
//! |-------------|--------------------------|-------------------------------|
//! | `device_id` |                          | eFuse MAC → DevEUI, short id  |
//! | `log_sink`  | EventSink                | Serial log output             |
//! | `nvs`       | ConfigPort, StoragePort  | NVS / in-memory store         |
//! | `sim`       | SensorPort drivers,      | Simulated I2C bus and LoRa    |
//! |             | RadioPort, Platform      | stack (host only)             |
//! | `system`    | SystemPort               | Task watchdog, esp_restart    |
//! | `time`      | DelayNs                  | FreeRTOS delay / host sleep   |

pub mod device_id;
pub mod log_sink;
pub mod nvs;
#[cfg(feature = "sim")]
pub mod sim;
pub mod system;
pub mod time;
