//! Measurement cycle timer.
//!
//! A periodic timer polled from the controller loop. Firings are phase
//! locked to the moment the timer was armed: a cycle that runs long does
//! not shift later firings.
//!
//! ```text
//!  armed        due          due          due          due
//!    │───── P ────│───── P ────│───── P ────│───── P ────│
//!                 ╞═ cycle ═╡  ╞══════ long cycle ══════╡
//!                                                        ▲ missed firings
//!                                                          coalesce into one
//!                                                          immediate run
//! ```
//!
//! Cycles never overlap because the controller is single threaded. When a
//! cycle overruns one or more periods, the pending firing runs as soon as
//! the loop polls again; the extra missed firings collapse into it rather
//! than queueing up behind it.

use log::{debug, warn};

pub struct CycleTimer {
    period_ms: u64,
    next_due_ms: Option<u64>,
    fired: u64,
    coalesced: u64,
}

impl CycleTimer {
    pub const fn new() -> Self {
        Self {
            period_ms: 0,
            next_due_ms: None,
            fired: 0,
            coalesced: 0,
        }
    }

    /// Start firing every `period_secs`, first firing one period from `now_ms`.
    pub fn arm(&mut self, now_ms: u64, period_secs: u16) {
        self.period_ms = u64::from(period_secs) * 1000;
        self.next_due_ms = Some(now_ms + self.period_ms);
        debug!("cycle timer armed: every {} s", period_secs);
    }

    pub fn disarm(&mut self) {
        self.next_due_ms = None;
    }

    /// Returns `true` once per due firing.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let Some(due) = self.next_due_ms else {
            return false;
        };
        if now_ms < due || self.period_ms == 0 {
            return false;
        }

        let mut next = due + self.period_ms;
        let mut missed = 0u64;
        while next <= now_ms {
            next += self.period_ms;
            missed += 1;
        }
        if missed > 0 {
            warn!(
                "measurement cycle overran by {} period(s), running late",
                missed
            );
            self.coalesced += missed;
        }

        self.next_due_ms = Some(next);
        self.fired += 1;
        true
    }

    /// Milliseconds until the next firing (0 if already due).
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.next_due_ms.map(|due| due.saturating_sub(now_ms))
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

impl Default for CycleTimer {
    fn default() -> Self {
        Self::new()
    }
}
