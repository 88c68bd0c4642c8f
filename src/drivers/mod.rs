//! Low-level peripheral drivers.

pub mod watchdog;
