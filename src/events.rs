//! Radio event queue.
//!
//! The LoRaWAN stack reports transmit and receive outcomes asynchronously
//! (from its own task or an interrupt callback). Instead of running node
//! logic in that context, the radio adapter posts a [`RadioEvent`] into a
//! bounded channel and returns; the controller drains the channel from
//! its own loop.
//!
//! ```text
//! ┌──────────────┐  try_send   ┌──────────────┐  try_receive  ┌──────────────┐
//! │ Radio stack  │────────────▶│ RadioEvents  │──────────────▶│ Controller   │
//! │ (callback)   │──┐          │ (bounded)    │          ┌───▶│ (main loop)  │
//! └──────────────┘  │ TxFailed └──────────────┘          │    └──────────────┘
//!                   │ on overflow ┌──────────────┐       │
//!                   └────────────▶│ tx_failed    │───────┘
//!                                 │ (Signal)     │  try_take
//!                                 └──────────────┘
//! ```
//!
//! A transmit failure must never be lost, so one that finds the queue full
//! is latched in a [`Signal`] and handed out after the queued events.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Maximum number of pending radio events.
pub const RADIO_EVENT_DEPTH: usize = 8;

/// Asynchronous notifications raised by the LoRaWAN link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// A downlink packet arrived.
    RxPacket,
    /// An uplink was transmitted (and acknowledged, for confirmed uplinks).
    TxPacket,
    /// An uplink failed after the MAC layer exhausted its retries.
    TxFailed,
}

/// Events flowing from the radio to the controller.
pub struct RadioEvents {
    queue: Channel<CriticalSectionRawMutex, RadioEvent, RADIO_EVENT_DEPTH>,
    tx_failed: Signal<CriticalSectionRawMutex, ()>,
}

impl RadioEvents {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            tx_failed: Signal::new(),
        }
    }
}

impl Default for RadioEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Post an event. Safe to call from the radio callback context.
/// Returns `false` if the event was dropped; a `TxFailed` never is.
pub fn post(events: &RadioEvents, event: RadioEvent) -> bool {
    if events.queue.try_send(event).is_ok() {
        return true;
    }
    if event == RadioEvent::TxFailed {
        events.tx_failed.signal(());
        return true;
    }
    false
}

/// Drain all pending events into a callback, in FIFO order. A latched
/// transmit failure comes last.
pub fn drain(events: &RadioEvents, mut handler: impl FnMut(RadioEvent)) {
    while let Ok(event) = events.queue.try_receive() {
        handler(event);
    }
    if events.tx_failed.try_take().is_some() {
        handler(RadioEvent::TxFailed);
    }
}

/// Discard everything pending, latch included.
pub fn clear(events: &RadioEvents) {
    events.queue.clear();
    events.tx_failed.reset();
}
