//! Downlink commands.
//!
//! Every downlink starts with a little-endian `u16` opcode; the payload
//! that follows is opcode-specific. Decoding never fails: frames too short
//! to carry an opcode decode as opcode 0, unknown opcodes decode to
//! [`DownlinkCommand::Unknown`], and a known opcode with a truncated
//! payload decodes to [`DownlinkCommand::Malformed`]. Trailing bytes past
//! the expected payload are ignored.

use crate::sensors::BaselinePair;

pub const OP_REBOOT: u16 = 0x0011;
pub const OP_SET_INTERVAL: u16 = 0x0012;
pub const OP_SET_BASELINE: u16 = 0x0013;

/// Operator command carried in a downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkCommand {
    /// Restart the node.
    Reboot,
    /// Persist a new measurement interval and restart.
    SetInterval { secs: u16 },
    /// Force the SGP30 baseline from the next cycle on.
    SetBaseline(BaselinePair),
    /// Known opcode, payload too short.
    Malformed { opcode: u16 },
    /// Anything else, including frames shorter than an opcode.
    Unknown { opcode: u16 },
}

impl DownlinkCommand {
    pub fn decode(frame: &[u8]) -> Self {
        let Some((opcode, payload)) = split_u16(frame) else {
            return Self::Unknown { opcode: 0 };
        };

        match opcode {
            OP_REBOOT => Self::Reboot,
            OP_SET_INTERVAL => match split_u16(payload) {
                Some((secs, _)) => Self::SetInterval { secs },
                None => Self::Malformed { opcode },
            },
            OP_SET_BASELINE => {
                let pair = split_u16(payload)
                    .and_then(|(voc, rest)| split_u16(rest).map(|(co2eq, _)| (voc, co2eq)));
                match pair {
                    Some((voc, co2eq)) => Self::SetBaseline(BaselinePair { voc, co2eq }),
                    None => Self::Malformed { opcode },
                }
            }
            _ => Self::Unknown { opcode },
        }
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Self::Reboot => OP_REBOOT,
            Self::SetInterval { .. } => OP_SET_INTERVAL,
            Self::SetBaseline(_) => OP_SET_BASELINE,
            Self::Malformed { opcode } | Self::Unknown { opcode } => *opcode,
        }
    }
}

fn split_u16(bytes: &[u8]) -> Option<(u16, &[u8])> {
    match bytes {
        [lo, hi, rest @ ..] => Some((u16::from_le_bytes([*lo, *hi]), rest)),
        _ => None,
    }
}
