//! Shared mutable context threaded through every FSM handler.
//!
//! `NodeContext` owns the peripherals (through the [`Platform`] bundle),
//! the node's runtime state, the cycle timer and the pending restart
//! decision. State handlers read and write it; nothing else does.

use embedded_hal::delay::DelayNs;

use crate::app::events::NodeEvent;
use crate::app::ports::{EventSink, Platform, SystemPort};
use crate::config::NodeConfig;
use crate::diagnostics::RestartLog;
use crate::events::RadioEvents;
use crate::fault::{FaultPolicy, RestartReason};
use crate::scheduler::CycleTimer;
use crate::sensors::BaselinePair;

// ---------------------------------------------------------------------------
// Measurement sample
// ---------------------------------------------------------------------------

/// One reading of every channel. `None` means the sensor had nothing to
/// offer this cycle (driver error or NaN); it goes on air as the sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeasurementSample {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub tvoc_ppb: Option<f32>,
    pub eco2_ppm: Option<f32>,
    pub pm1: Option<f32>,
    pub pm2_5: Option<f32>,
    pub pm4: Option<f32>,
    pub pm10: Option<f32>,
}

/// Drop NaN readings.
pub fn channel(value: f32) -> Option<f32> {
    (!value.is_nan()).then_some(value)
}

// ---------------------------------------------------------------------------
// Node state
// ---------------------------------------------------------------------------

/// SGP30 baseline as last read back or forced by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Baseline {
    pub voc: u16,
    pub co2eq: u16,
    /// Set by SET_BASELINE; the values are pushed to the sensor every cycle.
    pub manual: bool,
}

impl Baseline {
    pub fn pair(&self) -> BaselinePair {
        BaselinePair {
            voc: self.voc,
            co2eq: self.co2eq,
        }
    }
}

/// Runtime state of the node.
pub struct NodeState {
    pub measurement_interval_secs: u16,
    pub jitter_ms: u32,
    pub baseline: Baseline,
    pub joined: bool,
    pub fault: FaultPolicy,
    pub cycles_completed: u64,
}

impl NodeState {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            measurement_interval_secs: config.measurement_interval_secs,
            jitter_ms: config.jitter_ms,
            baseline: Baseline::default(),
            joined: false,
            fault: FaultPolicy::new(u64::from(config.watchdog_timeout_secs()) * 1000),
            cycles_completed: 0,
        }
    }

    /// Consecutive sensor-bus presence failures.
    pub fn fail_count(&self) -> u8 {
        self.fault.fail_count()
    }
}

// ---------------------------------------------------------------------------
// Peripherals
// ---------------------------------------------------------------------------

/// One adapter per port, as named by the [`Platform`].
pub struct Peripherals<P: Platform> {
    pub sensors: P::Sensors,
    pub radio: P::Radio,
    pub store: P::Store,
    pub system: P::System,
    pub delay: P::Delay,
    pub sink: P::Sink,
}

// ---------------------------------------------------------------------------
// NodeContext
// ---------------------------------------------------------------------------

pub struct NodeContext<P: Platform> {
    pub hw: Peripherals<P>,
    /// Radio notifications, drained once per loop iteration.
    pub events: &'static RadioEvents,
    /// Loaded in `Init`; defaults until then.
    pub config: NodeConfig,
    pub state: NodeState,
    pub timer: CycleTimer,
    pub restart_log: RestartLog,
    /// Set by whichever handler decides to restart; consumed by `Fatal`.
    pub restart: Option<RestartReason>,
    /// Join status polls since the join was issued.
    pub join_polls: u32,
}

impl<P: Platform> NodeContext<P> {
    pub fn new(hw: Peripherals<P>, events: &'static RadioEvents) -> Self {
        let config = NodeConfig::default();
        Self {
            hw,
            events,
            state: NodeState::new(&config),
            config,
            timer: CycleTimer::new(),
            restart_log: RestartLog::new(),
            restart: None,
            join_polls: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.hw.system.uptime_ms()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.hw.delay.delay_ms(ms);
    }

    pub fn emit(&mut self, event: NodeEvent) {
        self.hw.sink.emit(&event);
    }

    pub fn feed_watchdog(&mut self) {
        self.hw.system.feed_watchdog();
        let now = self.now_ms();
        self.state.fault.note_feed(now);
    }

    /// Record a restart decision. The first one wins.
    pub fn request_restart(&mut self, reason: RestartReason) {
        if self.restart.is_none() {
            self.restart = Some(reason);
        }
    }
}
