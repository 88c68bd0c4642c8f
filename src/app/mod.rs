//! Application core: node lifecycle and command handling, no direct I/O.
//!
//! All interaction with sensors, radio, storage and the watchdog happens
//! through the **port traits** in [`ports`], so everything here runs
//! against mocks on the host.

pub mod commands;
pub mod controller;
pub mod dispatcher;
pub mod events;
pub mod ports;
