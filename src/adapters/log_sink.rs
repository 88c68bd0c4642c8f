//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing node events to the `log` facade
//! (UART on the device, stderr in simulation). Routine events are
//! `info`/`debug`, so turning debug mode off leaves only the warnings.

use log::{debug, info, warn};

use crate::app::events::NodeEvent;
use crate::app::ports::EventSink;
use crate::events::RadioEvent;

/// Install the platform log backend: ESP-IDF's UART logger on the device,
/// `env_logger` on the host (filter from `RUST_LOG`, `debug` by default).
///
/// The controller narrows the level afterwards from the debug flag.
pub fn init_logger() -> anyhow::Result<()> {
    #[cfg(target_os = "espidf")]
    esp_idf_logger::init()?;

    #[cfg(all(not(target_os = "espidf"), feature = "sim"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .try_init()?;

    Ok(())
}

/// Adapter that logs every [`NodeEvent`] as one line.
pub struct LogEventSink {
    device_id: heapless::String<16>,
}

impl LogEventSink {
    pub fn new(device_id: &str) -> Self {
        let mut id = heapless::String::new();
        for c in device_id.chars() {
            if id.push(c).is_err() {
                break;
            }
        }
        Self { device_id: id }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent) {
        let id = self.device_id.as_str();
        match event {
            NodeEvent::Started {
                interval_secs,
                jitter_ms,
            } => {
                info!("{id} START | interval={interval_secs}s jitter={jitter_ms}ms");
            }
            NodeEvent::StateChanged { from, to } => {
                info!("{id} STATE | {:?} -> {:?}", from, to);
            }
            NodeEvent::Joined { dev_eui } => {
                info!("{id} JOIN  | dev_eui={:02X?}", dev_eui);
            }
            NodeEvent::SensorsMissing {
                responding,
                fail_count,
            } => {
                warn!("{id} BUS   | responding={responding} fail_count={fail_count}");
            }
            NodeEvent::UplinkSent { len } => {
                info!("{id} TX    | {len} bytes");
            }
            NodeEvent::DownlinkReceived { port, len } => {
                info!("{id} RX    | {len} bytes on port {port}");
            }
            NodeEvent::CommandApplied(cmd) => {
                info!("{id} CMD   | applied {:?}", cmd);
            }
            NodeEvent::CommandIgnored(cmd) => {
                debug!("{id} CMD   | ignored {:?}", cmd);
            }
            NodeEvent::Radio(ev) => match ev {
                RadioEvent::RxPacket => info!("{id} LORA  | RX ok"),
                RadioEvent::TxPacket => info!("{id} LORA  | TX ok"),
                RadioEvent::TxFailed => warn!("{id} LORA  | TX failed"),
            },
            NodeEvent::RestartRequested(reason) => {
                warn!("{id} RESET | {reason}");
            }
        }
    }
}
