//! Watchdog, reset and uptime behind [`SystemPort`].
//!
//! On the device a restart is `esp_restart()` and never returns. In
//! simulation the request is recorded and the caller decides how to
//! "reboot" (the host binary rebuilds the controller).

use log::warn;

use super::time::Uptime;
use crate::app::ports::SystemPort;
use crate::drivers::watchdog::Watchdog;
use crate::fault::RestartReason;

pub struct DeviceSystem {
    uptime: Uptime,
    watchdog: Option<Watchdog>,
    restart_requested: Option<RestartReason>,
}

impl Default for DeviceSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSystem {
    pub fn new() -> Self {
        Self {
            uptime: Uptime::new(),
            watchdog: None,
            restart_requested: None,
        }
    }

    /// The restart the controller asked for (simulation only ever sees one).
    pub fn restart_requested(&self) -> Option<RestartReason> {
        self.restart_requested
    }
}

impl SystemPort for DeviceSystem {
    fn arm_watchdog(&mut self, timeout_ms: u32) {
        if self.watchdog.is_some() {
            warn!("watchdog already armed");
            return;
        }
        self.watchdog = Some(Watchdog::new(timeout_ms));
    }

    fn feed_watchdog(&mut self) {
        if let Some(wd) = self.watchdog.as_mut() {
            if wd.expired() {
                warn!(
                    "watchdog expired before feed ({} ms); a device would have reset",
                    wd.timeout_ms()
                );
            }
            wd.feed();
        }
    }

    fn restart(&mut self, reason: RestartReason) {
        self.restart_requested = Some(reason);

        #[cfg(target_os = "espidf")]
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }

        #[cfg(not(target_os = "espidf"))]
        warn!("restart requested (simulation): {}", reason);
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime.millis()
    }
}
