//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the controller
//! stops feeding it within the configured timeout. The timeout is set
//! once per boot from the measurement interval.
//!
//! Off-target the watchdog only tracks the last feed so the simulation
//! can report a stall it would otherwise have reset on.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

pub struct Watchdog {
    timeout_ms: u32,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    last_feed: std::time::Instant,
}

impl Watchdog {
    /// Configure the TWDT and subscribe the current task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self {
                    timeout_ms,
                    subscribed,
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Watchdog(sim): {} ms timeout", timeout_ms);
            Self {
                timeout_ms,
                last_feed: std::time::Instant::now(),
            }
        }
    }

    pub fn feed(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.last_feed = std::time::Instant::now();
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Whether the last feed is older than the timeout. Always `false` on
    /// hardware: there, an expired watchdog has already reset the chip.
    pub fn expired(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            false
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.last_feed.elapsed().as_millis() > u128::from(self.timeout_ms)
        }
    }
}
