//! IAQ node firmware library.
//!
//! A LoRaWAN indoor-air-quality node: three I2C sensors sampled on a
//! fixed interval, one 28-byte uplink per cycle, a handful of downlink
//! commands, and a watchdog-backed restart policy.
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, so the whole controller runs on the host against
//! mock or simulated adapters.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fault;
pub mod fsm;
pub mod scheduler;
pub mod sensors;
