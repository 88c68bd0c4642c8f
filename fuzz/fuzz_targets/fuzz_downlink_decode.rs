//! Fuzz target: downlink command decoding and dispatch.
//!
//! Feeds arbitrary bytes to `DownlinkCommand::decode` and applies the
//! result to a fresh node state. Neither may panic, whatever arrives in
//! the receive window.
//!
//! cargo fuzz run fuzz_downlink_decode

#![no_main]

use iaqnode::adapters::nvs::NvsAdapter;
use iaqnode::app::commands::DownlinkCommand;
use iaqnode::app::dispatcher::dispatch;
use iaqnode::config::NodeConfig;
use iaqnode::fsm::context::NodeState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let cmd = DownlinkCommand::decode(data);
    if data.len() >= 2 {
        assert_eq!(cmd.opcode(), u16::from_le_bytes([data[0], data[1]]));
    }

    let Ok(mut store) = NvsAdapter::new() else {
        return;
    };
    let mut state = NodeState::new(&NodeConfig::default());
    let _ = dispatch(&cmd, &mut state, &mut store);
});
