//! IAQ node firmware: host simulation entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorArray<SimBus>  SimRadio     NvsAdapter    DeviceSystem  │
//! │  (SensorPort)         (RadioPort)  (Config+NVS)  (SystemPort)  │
//! │  LogEventSink         SystemDelay                              │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            NodeController (pure logic)                 │    │
//! │  │  FSM · FaultPolicy · CycleTimer · Dispatcher           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A device restart is modelled by tearing the controller down and
//! building a fresh one around the same store, the way flash survives a
//! reset.
//!
//! Environment:
//! - `IAQNODE_SIM_SCENARIO`: `healthy` | `flaky-bus` | `missing-sensor` | `lossy-link`
//! - `IAQNODE_SIM_INTERVAL`: seed the persisted interval (seconds)
//! - `IAQNODE_SIM_DOWNLINK`: hex payload delivered in the first receive window
//! - `IAQNODE_SIM_BOOTS`: number of boots before exiting (default 3)
//! - `RUST_LOG`: env_logger filter

use anyhow::{Context, Result};
use log::info;

use iaqnode::adapters::device_id;
use iaqnode::adapters::log_sink::{self, LogEventSink};
use iaqnode::adapters::nvs::NvsAdapter;
use iaqnode::adapters::sim::{sim_sensors, Scenario, SimPlatform, SimRadio};
use iaqnode::adapters::system::DeviceSystem;
use iaqnode::adapters::time::SystemDelay;
use iaqnode::app::controller::NodeController;
use iaqnode::app::ports::{ConfigPort, MAX_DOWNLINK_LEN};
use iaqnode::config::RUNTIME_INTERVAL_RANGE;
use iaqnode::diagnostics::RestartLog;
use iaqnode::error::Error;
use iaqnode::events::{self, RadioEvents};
use iaqnode::fsm::context::Peripherals;

const DEFAULT_BOOTS: u32 = 3;
const DOWNLINK_PORT: u8 = 1;

fn main() -> Result<()> {
    log_sink::init_logger()?;

    let scenario = Scenario::from_env();
    let mac = device_id::read_mac();
    let id = device_id::device_id(&mac);

    info!("╔══════════════════════════════════════╗");
    info!("║  IAQ node v{:<8} (simulation)      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    info!("Device ID: {} scenario={}", id, scenario);

    let events: &'static RadioEvents = Box::leak(Box::new(RadioEvents::new()));

    let mut store = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    if let Some(secs) = interval_override()? {
        store.save_interval(secs).map_err(Error::from)?;
        info!("seeded interval: {} s", secs);
    }
    let mut downlink = downlink_override()?;

    let boots = env_parse::<u32>("IAQNODE_SIM_BOOTS")?.unwrap_or(DEFAULT_BOOTS);
    for boot in 1..=boots {
        info!("── boot {}/{} ──", boot, boots);

        let mut radio = SimRadio::new(mac, scenario);
        if let Some(payload) = downlink.take() {
            radio.queue_downlink(DOWNLINK_PORT, &payload);
        }

        let hw = Peripherals::<SimPlatform> {
            sensors: sim_sensors(scenario),
            radio,
            store,
            system: DeviceSystem::new(),
            delay: SystemDelay,
            sink: LogEventSink::new(&id),
        };

        let mut node = NodeController::new(hw, events);
        let reason = node.run();
        info!(
            "boot {} ended after {} cycle(s): {}",
            boot,
            node.node_state().cycles_completed,
            reason
        );

        store = node.into_peripherals().store;
        // A reset loses whatever the radio had queued.
        events::clear(events);
    }

    let mut log = RestartLog::new();
    log.init(&store);
    for entry in log.read_all(&store) {
        info!(
            "restart #{}: {} (uptime {} s, {} cycles)",
            entry.sequence, entry.reason, entry.uptime_secs, entry.cycles
        );
    }
    Ok(())
}

fn env_parse<T: core::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{name}: cannot parse {v:?}")),
        Err(_) => Ok(None),
    }
}

fn interval_override() -> Result<Option<u16>> {
    let Some(secs) = env_parse::<u16>("IAQNODE_SIM_INTERVAL")? else {
        return Ok(None);
    };
    if !RUNTIME_INTERVAL_RANGE.contains(&secs) {
        return Err(anyhow::Error::new(Error::Config("IAQNODE_SIM_INTERVAL out of range"))
            .context("interval override"));
    }
    Ok(Some(secs))
}

fn downlink_override() -> Result<Option<Vec<u8>>> {
    let Ok(hex) = std::env::var("IAQNODE_SIM_DOWNLINK") else {
        return Ok(None);
    };
    let hex = hex.trim();
    if !hex.is_ascii() || hex.len() % 2 != 0 || hex.len() / 2 > MAX_DOWNLINK_LEN {
        anyhow::bail!("IAQNODE_SIM_DOWNLINK: expected up to {MAX_DOWNLINK_LEN} hex-encoded bytes");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("IAQNODE_SIM_DOWNLINK: bad byte at offset {i}"))
        })
        .collect::<Result<Vec<u8>>>()
        .map(Some)
}
