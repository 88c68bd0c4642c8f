//! Applies decoded downlink commands to node state.
//!
//! Restarts are not performed here; the dispatcher only reports that one
//! is needed so the controller can finish its bookkeeping first.

use log::{info, warn};

use super::commands::DownlinkCommand;
use super::ports::ConfigPort;
use crate::config::RUNTIME_INTERVAL_RANGE;
use crate::fault::RestartReason;
use crate::fsm::context::{Baseline, NodeState};

/// What the controller must do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// State changed, keep going.
    Applied,
    /// Nothing changed.
    Ignored,
    /// Restart after the command delay.
    Restart(RestartReason),
}

pub fn dispatch(
    cmd: &DownlinkCommand,
    state: &mut NodeState,
    store: &mut impl ConfigPort,
) -> Dispatch {
    match *cmd {
        DownlinkCommand::Reboot => {
            info!("reboot requested over the air");
            Dispatch::Restart(RestartReason::RebootCommand)
        }
        DownlinkCommand::SetInterval { secs } => {
            if !RUNTIME_INTERVAL_RANGE.contains(&secs) {
                info!("ignoring measurement interval {} s (out of range)", secs);
                return Dispatch::Ignored;
            }
            match store.save_interval(secs) {
                Ok(()) => {
                    info!("measurement interval set to {} s", secs);
                    Dispatch::Restart(RestartReason::IntervalChanged)
                }
                Err(e) => {
                    warn!("could not persist measurement interval: {}", e);
                    Dispatch::Ignored
                }
            }
        }
        DownlinkCommand::SetBaseline(pair) => {
            info!("SGP30 baseline received: {},{}", pair.voc, pair.co2eq);
            state.baseline = Baseline {
                voc: pair.voc,
                co2eq: pair.co2eq,
                manual: true,
            };
            Dispatch::Applied
        }
        DownlinkCommand::Malformed { opcode } => {
            info!("ignoring opcode 0x{:04X}: payload too short", opcode);
            Dispatch::Ignored
        }
        DownlinkCommand::Unknown { opcode } => {
            info!("ignoring unknown opcode 0x{:04X}", opcode);
            Dispatch::Ignored
        }
    }
}
