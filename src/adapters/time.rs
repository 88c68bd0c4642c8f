//! Monotonic time and blocking delays.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` for uptime and the
//!   FreeRTOS delay for blocking waits (yields to other tasks).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `std::thread::sleep` for host-side simulation.

use embedded_hal::delay::DelayNs;

/// Time since boot.
pub struct Uptime {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

impl Uptime {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn millis(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Blocking delay provider for the controller.
#[derive(Default)]
pub struct SystemDelay;

impl DelayNs for SystemDelay {
    fn delay_ns(&mut self, ns: u32) {
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::Ets::delay_us(ns.div_ceil(1_000));

        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);

        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
