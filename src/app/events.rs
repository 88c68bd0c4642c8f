//! Outbound node events.
//!
//! The [`NodeController`](super::controller::NodeController) emits these
//! through the [`EventSink`](super::ports::EventSink) port. Adapters on
//! the other side decide what to do with them: log to serial, count them
//! in a test, and so on.

use crate::app::commands::DownlinkCommand;
use crate::events::RadioEvent;
use crate::fault::RestartReason;
use crate::fsm::StateId;

/// Structured events emitted by the node core.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Init finished (carries the effective configuration).
    Started { interval_secs: u16, jitter_ms: u32 },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// OTAA join completed and the socket is open.
    Joined { dev_eui: [u8; 8] },

    /// Fewer than the expected sensors answered the bus scan.
    SensorsMissing { responding: usize, fail_count: u8 },

    /// An uplink was handed to the radio.
    UplinkSent { len: usize },

    /// A datagram arrived in the receive window.
    DownlinkReceived { port: u8, len: usize },

    /// A downlink command changed node state.
    CommandApplied(DownlinkCommand),

    /// A downlink was dropped (unknown opcode, short payload, out of range).
    CommandIgnored(DownlinkCommand),

    /// Notification drained from the radio event queue.
    Radio(RadioEvent),

    /// The node is about to restart.
    RestartRequested(RestartReason),
}
