//! Fault policy.
//!
//! Decides when the node gives up and restarts. Three inputs:
//!
//! 1. **Bus presence**: checked at the top of every cycle. Fewer than
//!    [`EXPECTED_DEVICES`] acknowledging counts as one failure; a healthy
//!    scan resets the counter. The restart fires on the cycle where the
//!    counter goes past [`MAX_PRESENCE_FAILURES`].
//! 2. **Radio outcome**: a transmit failure reported by the link (or a
//!    send rejected outright) restarts immediately.
//! 3. **Watchdog cadence**: fed after join and after every completed
//!    cycle; the policy tracks the last feed so a stalled loop is visible
//!    in the log before the hardware bites.
//!
//! Individual channel dropouts are not faults here: they become sentinel
//! values in the uplink.

use core::fmt;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::events::RadioEvent;
use crate::sensors::EXPECTED_DEVICES;

/// Consecutive presence failures tolerated before restarting.
pub const MAX_PRESENCE_FAILURES: u8 = 3;

/// Why the node is about to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartReason {
    /// Sensor bus presence failed more than [`MAX_PRESENCE_FAILURES`] times.
    SensorBusAbsent,
    /// The link reported an uplink failure.
    TransmitFailed,
    /// The LoRa stack or socket could not be set up.
    RadioSetup,
    /// REBOOT downlink.
    RebootCommand,
    /// SET_INTERVAL downlink persisted a new interval.
    IntervalChanged,
    /// Fatal state entered without a recorded reason.
    Unhandled,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorBusAbsent => write!(f, "sensor bus absent"),
            Self::TransmitFailed => write!(f, "transmit failed"),
            Self::RadioSetup => write!(f, "radio setup failed"),
            Self::RebootCommand => write!(f, "reboot command"),
            Self::IntervalChanged => write!(f, "measurement interval changed"),
            Self::Unhandled => write!(f, "unhandled fault"),
        }
    }
}

/// Outcome of one presence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceVerdict {
    Healthy,
    /// Some devices missing; keep going and count it.
    Degraded { fail_count: u8 },
    /// Too many consecutive failures.
    Restart,
}

pub struct FaultPolicy {
    fail_count: u8,
    watchdog_timeout_ms: u64,
    last_feed_ms: Option<u64>,
}

impl FaultPolicy {
    pub fn new(watchdog_timeout_ms: u64) -> Self {
        Self {
            fail_count: 0,
            watchdog_timeout_ms,
            last_feed_ms: None,
        }
    }

    /// Record one bus presence scan.
    pub fn record_presence(&mut self, responding: usize) -> PresenceVerdict {
        if responding >= EXPECTED_DEVICES {
            if self.fail_count > 0 {
                info!(
                    "sensor bus recovered after {} failed check(s)",
                    self.fail_count
                );
            }
            self.fail_count = 0;
            return PresenceVerdict::Healthy;
        }

        self.fail_count = self.fail_count.saturating_add(1);
        warn!(
            "only {}/{} sensors responding (failure {})",
            responding, EXPECTED_DEVICES, self.fail_count
        );
        if self.fail_count > MAX_PRESENCE_FAILURES {
            error!("sensor bus absent for {} cycles", self.fail_count);
            PresenceVerdict::Restart
        } else {
            PresenceVerdict::Degraded {
                fail_count: self.fail_count,
            }
        }
    }

    pub fn fail_count(&self) -> u8 {
        self.fail_count
    }

    /// Map an asynchronous radio notification to a restart decision.
    pub fn on_radio_event(&self, event: RadioEvent) -> Option<RestartReason> {
        match event {
            RadioEvent::TxFailed => {
                error!("uplink failed");
                Some(RestartReason::TransmitFailed)
            }
            RadioEvent::TxPacket | RadioEvent::RxPacket => None,
        }
    }

    /// Remember a watchdog feed. Returns `true` if the previous feed was
    /// further back than the watchdog timeout.
    pub fn note_feed(&mut self, now_ms: u64) -> bool {
        let late = self.feed_overdue(now_ms);
        if late {
            warn!("watchdog fed late ({} ms timeout)", self.watchdog_timeout_ms);
        }
        self.last_feed_ms = Some(now_ms);
        late
    }

    /// Whether the hardware watchdog would already have expired.
    pub fn feed_overdue(&self, now_ms: u64) -> bool {
        self.last_feed_ms
            .is_some_and(|last| now_ms.saturating_sub(last) > self.watchdog_timeout_ms)
    }

    pub fn last_feed_ms(&self) -> Option<u64> {
        self.last_feed_ms
    }
}
