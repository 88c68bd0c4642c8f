//! Restart log.
//!
//! Every deliberate restart appends a [`RestartEntry`] to a 4-slot NVS
//! ring under the "restarts" namespace before the reset is triggered.
//! Entries are postcard-encoded. A monotonically increasing sequence
//! number is persisted alongside; the slot is `sequence % 4`, so after a
//! wrap the newest entry is simply the one with the highest sequence.
//!
//! Watchdog resets leave no entry (nothing runs before the hardware
//! bites), which is itself the signal when reading the log back.

use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::fault::RestartReason;

const RING_SLOTS: usize = 4;
const NAMESPACE: &str = "restarts";
const SEQUENCE_KEY: &str = "seq";
const MAX_ENTRY_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartEntry {
    /// Assigned by [`RestartLog::record`].
    pub sequence: u32,
    pub uptime_secs: u64,
    /// Measurement cycles completed since boot.
    pub cycles: u64,
    pub reason: RestartReason,
}

/// NVS-backed ring of restart entries.
#[derive(Default)]
pub struct RestartLog {
    next_sequence: u32,
}

impl RestartLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the sequence counter from NVS, or start at 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(NAMESPACE, SEQUENCE_KEY, &mut buf) {
            self.next_sequence = u32::from_le_bytes(buf);
        }
    }

    /// Write an entry to the next slot. Storage errors are logged and
    /// swallowed: the restart happens regardless.
    pub fn record(&mut self, nvs: &mut dyn StoragePort, mut entry: RestartEntry) {
        entry.sequence = self.next_sequence;
        let slot = Self::slot_key(self.next_sequence as usize % RING_SLOTS);

        match postcard::to_allocvec(&entry) {
            Ok(bytes) => {
                if let Err(e) = nvs.write(NAMESPACE, &slot, &bytes) {
                    log::warn!("restart log write failed: {}", e);
                }
            }
            Err(e) => log::warn!("restart log encode failed: {}", e),
        }

        self.next_sequence = self.next_sequence.wrapping_add(1);
        if let Err(e) = nvs.write(NAMESPACE, SEQUENCE_KEY, &self.next_sequence.to_le_bytes()) {
            log::warn!("restart log sequence write failed: {}", e);
        }
    }

    /// All stored entries, oldest slot first.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> heapless::Vec<RestartEntry, RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for i in 0..RING_SLOTS {
            let mut buf = [0u8; MAX_ENTRY_LEN];
            if let Ok(len) = nvs.read(NAMESPACE, &Self::slot_key(i), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<RestartEntry>(&buf[..len]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Number of occupied slots.
    pub fn count(&self, nvs: &dyn StoragePort) -> usize {
        (0..RING_SLOTS)
            .filter(|i| nvs.exists(NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}
