//! Concrete state handler functions and table builder.
//!
//! ```text
//!  INIT ──▶ JOINING ──[joined, socket open]──▶ CONNECTED ─┐
//!   │          │                                 ▲   │    │ timer
//!   │          └──[not yet]── poll 2.5 s ─┐      │   ▼    │
//!   │                 ▲───────────────────┘    run_cycle ◀┘
//!   │
//!   └──── any restart decision (setup, bus, TX, command) ──▶ FATAL ──▶ reset
//! ```
//!
//! Handlers block on the platform delay for every settle period, so the
//! whole node runs on one thread and a cycle can never overlap itself.

use log::{debug, error, info, warn};

use super::context::{channel, MeasurementSample, NodeContext};
use super::{StateDescriptor, StateId};
use crate::app::commands::DownlinkCommand;
use crate::app::dispatcher::{dispatch, Dispatch};
use crate::app::events::NodeEvent;
use crate::app::ports::{
    ConfigPort, JoinRequest, Platform, RadioPort, SensorPort, SystemPort,
};
use crate::codec::{self, SENTINEL_BASELINE};
use crate::config::NodeConfig;
use crate::diagnostics::RestartEntry;
use crate::events;
use crate::fault::{PresenceVerdict, RestartReason};
use crate::sensors::{BaselinePair, SENSOR_SETTLE_MS};

/// Join status poll period.
pub const JOIN_POLL_MS: u32 = 2_500;
/// Settle time between opening the socket and the first uplink.
pub const POST_JOIN_SETTLE_MS: u32 = 5_000;
/// Pause between the uplink and the first receive poll.
pub const RX_WINDOW_DELAY_MS: u32 = 1_000;
/// Pause between consecutive downlinks.
pub const DOWNLINK_GAP_MS: u32 = 200;
/// Pause before a command-triggered restart.
pub const COMMAND_RESTART_DELAY_MS: u32 = 1_000;
/// Longest sleep between two loop iterations while waiting for the timer.
pub const IDLE_POLL_MS: u32 = 100;
/// Most datagrams drained from one receive window.
pub const MAX_DOWNLINKS_PER_WINDOW: usize = 16;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table<P: Platform>() -> [StateDescriptor<NodeContext<P>>; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Init,
            name: "Init",
            on_enter: Some(init_enter::<P>),
            on_exit: None,
            on_update: init_update::<P>,
        },
        StateDescriptor {
            id: StateId::Joining,
            name: "Joining",
            on_enter: Some(joining_enter::<P>),
            on_exit: None,
            on_update: joining_update::<P>,
        },
        StateDescriptor {
            id: StateId::Connected,
            name: "Connected",
            on_enter: Some(connected_enter::<P>),
            on_exit: Some(connected_exit::<P>),
            on_update: connected_update::<P>,
        },
        StateDescriptor {
            id: StateId::Fatal,
            name: "Fatal",
            on_enter: Some(fatal_enter::<P>),
            on_exit: None,
            on_update: fatal_update::<P>,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT
// ═══════════════════════════════════════════════════════════════════════════

fn init_enter<P: Platform>(ctx: &mut NodeContext<P>) {
    let config = match ctx.hw.store.load() {
        Ok(c) => c,
        Err(e) => {
            warn!("config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    log::set_max_level(if config.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    });

    ctx.state = super::context::NodeState::new(&config);
    let watchdog_ms = config.watchdog_timeout_secs() * 1000;
    ctx.config = config;

    ctx.restart_log.init(&ctx.hw.store);
    let previous = ctx.restart_log.read_all(&ctx.hw.store);
    if let Some(last) = previous.iter().max_by_key(|e| e.sequence) {
        info!(
            "{} restart(s) on record, last: {} after {} s",
            ctx.restart_log.count(&ctx.hw.store),
            last.reason,
            last.uptime_secs
        );
    }

    ctx.hw.system.arm_watchdog(watchdog_ms);
    info!("watchdog armed: {} ms", watchdog_ms);

    if let Err(e) = ctx.hw.sensors.start(&mut ctx.hw.delay) {
        // Missing sensors show up in the presence check of every cycle.
        warn!("sensor start-up incomplete: {}", e);
    }

    let jitter = ctx.state.jitter_ms;
    if jitter > 0 {
        info!("waiting {} ms ...", jitter);
        ctx.delay_ms(jitter);
    }

    if let Err(e) = ctx.hw.radio.init(&ctx.config.radio) {
        error!("LoRa stack init failed: {}", e);
        ctx.request_restart(RestartReason::RadioSetup);
    }

    ctx.emit(NodeEvent::Started {
        interval_secs: ctx.state.measurement_interval_secs,
        jitter_ms: jitter,
    });
}

fn init_update<P: Platform>(ctx: &mut NodeContext<P>) -> Option<StateId> {
    if ctx.restart.is_some() {
        Some(StateId::Fatal)
    } else {
        Some(StateId::Joining)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  JOINING
// ═══════════════════════════════════════════════════════════════════════════

fn joining_enter<P: Platform>(ctx: &mut NodeContext<P>) {
    let request = JoinRequest {
        dev_eui: ctx.hw.radio.device_eui(),
        app_eui: ctx.config.keys.app_eui,
        app_key: ctx.config.keys.app_key,
        data_rate: ctx.config.radio.data_rate,
    };
    ctx.join_polls = 0;
    if let Err(e) = ctx.hw.radio.join(&request) {
        error!("OTAA join could not be issued: {}", e);
        ctx.request_restart(RestartReason::RadioSetup);
    }
}

fn joining_update<P: Platform>(ctx: &mut NodeContext<P>) -> Option<StateId> {
    if ctx.restart.is_some() {
        return Some(StateId::Fatal);
    }

    // No timeout here: a join that never completes is bounded by the
    // watchdog, which is not fed until the socket is up.
    if !ctx.hw.radio.has_joined() {
        ctx.delay_ms(JOIN_POLL_MS);
        ctx.join_polls += 1;
        debug!("not joined to LoRaWAN yet ({} polls)", ctx.join_polls);
        return None;
    }

    let radio = ctx.config.radio;
    if let Err(e) = ctx
        .hw
        .radio
        .open_socket(radio.data_rate, radio.confirmed_uplinks)
    {
        error!("LoRa socket setup failed: {}", e);
        ctx.request_restart(RestartReason::RadioSetup);
        return Some(StateId::Fatal);
    }
    ctx.delay_ms(POST_JOIN_SETTLE_MS);
    ctx.hw.radio.subscribe(ctx.events);

    ctx.state.joined = true;
    info!("connected to LoRaWAN");
    ctx.feed_watchdog();

    let dev_eui = ctx.hw.radio.device_eui();
    ctx.emit(NodeEvent::Joined { dev_eui });
    Some(StateId::Connected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter<P: Platform>(ctx: &mut NodeContext<P>) {
    let now = ctx.now_ms();
    let period = ctx.state.measurement_interval_secs;
    ctx.timer.arm(now, period);
}

fn connected_exit<P: Platform>(ctx: &mut NodeContext<P>) {
    ctx.timer.disarm();
}

fn connected_update<P: Platform>(ctx: &mut NodeContext<P>) -> Option<StateId> {
    if let Err(reason) = handle_radio_events(ctx) {
        ctx.request_restart(reason);
    }
    if ctx.restart.is_some() {
        return Some(StateId::Fatal);
    }

    let now = ctx.now_ms();
    if ctx.timer.poll(now) {
        if let Err(reason) = run_cycle(ctx) {
            ctx.request_restart(reason);
            return Some(StateId::Fatal);
        }
        return None;
    }

    let wait = ctx
        .timer
        .remaining_ms(now)
        .map_or(IDLE_POLL_MS, |ms| ms.min(u64::from(IDLE_POLL_MS)) as u32);
    if wait > 0 {
        ctx.delay_ms(wait);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FATAL
// ═══════════════════════════════════════════════════════════════════════════

fn fatal_enter<P: Platform>(ctx: &mut NodeContext<P>) {
    let reason = ctx.restart.unwrap_or_else(|| {
        error!("fatal state entered without a restart reason");
        RestartReason::Unhandled
    });
    ctx.restart = Some(reason);

    let entry = RestartEntry {
        sequence: 0,
        uptime_secs: ctx.now_ms() / 1000,
        cycles: ctx.state.cycles_completed,
        reason,
    };
    ctx.restart_log.record(&mut ctx.hw.store, entry);

    warn!("restarting: {}", reason);
    ctx.emit(NodeEvent::RestartRequested(reason));
    ctx.hw.system.restart(reason);
}

/// Only reached when the platform restart returns (simulation, tests).
fn fatal_update<P: Platform>(ctx: &mut NodeContext<P>) -> Option<StateId> {
    ctx.delay_ms(IDLE_POLL_MS);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  Measurement cycle
// ═══════════════════════════════════════════════════════════════════════════

/// One measurement cycle:
/// presence → baseline push → sample → encode + send → receive window →
/// watchdog feed. Any `Err` is a restart decision.
///
/// The cycle is the running substate of `Connected`. It runs to completion
/// inside a single `connected_update` call, so the timer is not polled
/// again until it returns.
pub fn run_cycle<P: Platform>(ctx: &mut NodeContext<P>) -> Result<(), RestartReason> {
    check_presence(ctx)?;

    let (sample, baseline) = sample_sensors(ctx);

    let payload = codec::encode(&sample, baseline);
    debug!("sending payload, size: {}", payload.len());
    if let Err(e) = ctx.hw.radio.send(&payload) {
        error!("uplink rejected: {}", e);
        return Err(RestartReason::TransmitFailed);
    }
    ctx.emit(NodeEvent::UplinkSent { len: payload.len() });
    handle_radio_events(ctx)?;

    drain_receive_window(ctx)?;

    ctx.feed_watchdog();
    ctx.state.cycles_completed += 1;

    if let Some(stats) = ctx.hw.radio.stats() {
        debug!(
            "link: rssi {} dBm, snr {:.1} dB, DR{}, tx #{}",
            stats.rssi_dbm, stats.snr_db, stats.data_rate, stats.tx_counter
        );
    }
    Ok(())
}

fn check_presence<P: Platform>(ctx: &mut NodeContext<P>) -> Result<(), RestartReason> {
    let responding = ctx.hw.sensors.responding_devices();
    let verdict = ctx.state.fault.record_presence(responding);
    ctx.delay_ms(SENSOR_SETTLE_MS);

    match verdict {
        PresenceVerdict::Healthy => Ok(()),
        PresenceVerdict::Degraded { fail_count } => {
            ctx.emit(NodeEvent::SensorsMissing {
                responding,
                fail_count,
            });
            Ok(())
        }
        PresenceVerdict::Restart => {
            let fail_count = ctx.state.fail_count();
            ctx.emit(NodeEvent::SensorsMissing {
                responding,
                fail_count,
            });
            Err(RestartReason::SensorBusAbsent)
        }
    }
}

fn sample_sensors<P: Platform>(ctx: &mut NodeContext<P>) -> (MeasurementSample, BaselinePair) {
    let manual = ctx.state.baseline.manual;
    if manual {
        let pair = ctx.state.baseline.pair();
        if let Err(e) = ctx.hw.sensors.set_iaq_baseline(pair) {
            warn!("SGP30 baseline push failed: {}", e);
        }
    }

    let iaq = ctx.hw.sensors.read_iaq().map_err(|e| {
        warn!("SGP30 read failed: {}", e);
    });
    let baseline = match ctx.hw.sensors.iaq_baseline() {
        Ok(b) => {
            if !manual {
                ctx.state.baseline.voc = b.voc;
                ctx.state.baseline.co2eq = b.co2eq;
            }
            b
        }
        Err(e) => {
            warn!("SGP30 baseline readback failed: {}", e);
            BaselinePair {
                voc: SENTINEL_BASELINE,
                co2eq: SENTINEL_BASELINE,
            }
        }
    };

    ctx.delay_ms(SENSOR_SETTLE_MS);
    let co2 = ctx.hw.sensors.read_co2().map_err(|e| {
        warn!("SCD30 read failed: {}", e);
    });

    ctx.delay_ms(SENSOR_SETTLE_MS);
    let pm = ctx.hw.sensors.read_particulates().map_err(|e| {
        warn!("SPS30 read failed: {}", e);
    });

    let sample = MeasurementSample {
        temperature_c: co2.ok().and_then(|r| channel(r.temperature_c)),
        humidity_pct: co2.ok().and_then(|r| channel(r.humidity_pct)),
        co2_ppm: co2.ok().and_then(|r| channel(r.co2_ppm)),
        tvoc_ppb: iaq.ok().and_then(|r| channel(r.tvoc_ppb)),
        eco2_ppm: iaq.ok().and_then(|r| channel(r.eco2_ppm)),
        pm1: pm.ok().and_then(|r| channel(r.pm1)),
        pm2_5: pm.ok().and_then(|r| channel(r.pm2_5)),
        pm4: pm.ok().and_then(|r| channel(r.pm4)),
        pm10: pm.ok().and_then(|r| channel(r.pm10)),
    };
    (sample, baseline)
}

fn drain_receive_window<P: Platform>(ctx: &mut NodeContext<P>) -> Result<(), RestartReason> {
    ctx.delay_ms(RX_WINDOW_DELAY_MS);

    for _ in 0..MAX_DOWNLINKS_PER_WINDOW {
        let received = ctx.hw.radio.receive();
        // A transmit failure reported during the window ends the cycle.
        handle_radio_events(ctx)?;

        let downlink = match received {
            Ok(Some(d)) => d,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("receive failed, closing window: {}", e);
                return Ok(());
            }
        };

        info!(
            "received {:02X?} on port {}",
            downlink.data.as_slice(),
            downlink.port
        );
        ctx.emit(NodeEvent::DownlinkReceived {
            port: downlink.port,
            len: downlink.data.len(),
        });

        let cmd = DownlinkCommand::decode(&downlink.data);
        match dispatch(&cmd, &mut ctx.state, &mut ctx.hw.store) {
            Dispatch::Applied => ctx.emit(NodeEvent::CommandApplied(cmd)),
            Dispatch::Ignored => ctx.emit(NodeEvent::CommandIgnored(cmd)),
            Dispatch::Restart(reason) => {
                ctx.emit(NodeEvent::CommandApplied(cmd));
                ctx.delay_ms(COMMAND_RESTART_DELAY_MS);
                return Err(reason);
            }
        }
        ctx.delay_ms(DOWNLINK_GAP_MS);
    }

    warn!(
        "receive window closed after {} datagrams",
        MAX_DOWNLINKS_PER_WINDOW
    );
    Ok(())
}

/// Drain the radio event queue. A transmit failure anywhere in the queue
/// is a restart decision; every event is still reported.
fn handle_radio_events<P: Platform>(ctx: &mut NodeContext<P>) -> Result<(), RestartReason> {
    let queue = ctx.events;
    let mut verdict = Ok(());
    events::drain(queue, |event| {
        ctx.emit(NodeEvent::Radio(event));
        if let Some(reason) = ctx.state.fault.on_radio_event(event) {
            if verdict.is_ok() {
                verdict = Err(reason);
            }
        }
    });
    verdict
}
