//! Mock platform for integration tests.
//!
//! Every adapter records what the controller asked of it. Delays advance a
//! shared virtual clock instead of sleeping, so a two-minute measurement
//! interval costs nothing in wall time.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use iaqnode::adapters::nvs::NvsAdapter;
use iaqnode::app::controller::NodeController;
use iaqnode::app::events::NodeEvent;
use iaqnode::app::ports::{
    Downlink, EventSink, JoinRequest, Platform, RadioPort, SensorPort, SystemPort,
};
use iaqnode::config::RadioSettings;
use iaqnode::error::{RadioError, SensorError};
use iaqnode::events::{self, RadioEvent, RadioEvents};
use iaqnode::fault::RestartReason;
use iaqnode::fsm::context::Peripherals;
use iaqnode::fsm::StateId;
use iaqnode::sensors::{BaselinePair, Co2Reading, IaqReading, PmReading};

/// Virtual time in nanoseconds.
pub type Clock = Rc<Cell<u64>>;

// ── Sensors ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorCall {
    Start,
    Scan,
    PushBaseline(BaselinePair),
    ReadBaseline,
    ReadIaq,
    ReadCo2,
    ReadPm,
}

pub struct MockSensors {
    pub responding: usize,
    pub iaq: Result<IaqReading, SensorError>,
    pub co2: Result<Co2Reading, SensorError>,
    pub pm: Result<PmReading, SensorError>,
    pub baseline: Result<BaselinePair, SensorError>,
    pub calls: Vec<SensorCall>,
}

#[allow(dead_code)]
impl MockSensors {
    pub fn pushes(&self) -> Vec<BaselinePair> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SensorCall::PushBaseline(b) => Some(*b),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockSensors {
    fn default() -> Self {
        Self {
            responding: 3,
            iaq: Ok(IaqReading {
                tvoc_ppb: 12.0,
                eco2_ppm: 415.0,
            }),
            co2: Ok(Co2Reading {
                co2_ppm: 450.2,
                temperature_c: 22.31,
                humidity_pct: 45.67,
            }),
            pm: Ok(PmReading {
                pm1: 3.2,
                pm2_5: 5.1,
                pm4: 6.0,
                pm10: 7.8,
            }),
            baseline: Ok(BaselinePair {
                voc: 42000,
                co2eq: 410,
            }),
            calls: Vec::new(),
        }
    }
}

impl SensorPort for MockSensors {
    fn start(&mut self, delay: &mut impl DelayNs) -> Result<(), SensorError> {
        self.calls.push(SensorCall::Start);
        delay.delay_ms(600);
        Ok(())
    }

    fn responding_devices(&mut self) -> usize {
        self.calls.push(SensorCall::Scan);
        self.responding
    }

    fn set_iaq_baseline(&mut self, baseline: BaselinePair) -> Result<(), SensorError> {
        self.calls.push(SensorCall::PushBaseline(baseline));
        self.baseline = Ok(baseline);
        Ok(())
    }

    fn iaq_baseline(&mut self) -> Result<BaselinePair, SensorError> {
        self.calls.push(SensorCall::ReadBaseline);
        self.baseline
    }

    fn read_iaq(&mut self) -> Result<IaqReading, SensorError> {
        self.calls.push(SensorCall::ReadIaq);
        self.iaq
    }

    fn read_co2(&mut self) -> Result<Co2Reading, SensorError> {
        self.calls.push(SensorCall::ReadCo2);
        self.co2
    }

    fn read_particulates(&mut self) -> Result<PmReading, SensorError> {
        self.calls.push(SensorCall::ReadPm);
        self.pm
    }
}

// ── Radio ─────────────────────────────────────────────────────

pub struct MockRadio {
    pub polls_until_joined: u32,
    pub polls: u32,
    pub join_requests: Vec<JoinRequest>,
    pub socket: Option<(u8, bool)>,
    pub events: Option<&'static RadioEvents>,
    pub sent: Vec<Vec<u8>>,
    /// Post `TxFailed` instead of `TxPacket` after the next send.
    pub fail_next_tx: bool,
    /// Reject `send` outright.
    pub reject_send: bool,
    /// Raise `TxFailed` from the next `receive`, as a late MAC report would.
    pub fail_tx_on_receive: bool,
    pub downlinks: VecDeque<Downlink>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn queue_downlink(&mut self, data: &[u8]) {
        let Ok(data) = heapless::Vec::from_slice(data) else {
            panic!("downlink too long");
        };
        self.downlinks.push_back(Downlink { port: 1, data });
    }

    /// Inject an event as the stack would from its own context.
    pub fn raise(&self, event: RadioEvent) {
        let queue = self.events.expect("radio not subscribed");
        assert!(events::post(queue, event));
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            polls_until_joined: 0,
            polls: 0,
            join_requests: Vec::new(),
            socket: None,
            events: None,
            sent: Vec::new(),
            fail_next_tx: false,
            reject_send: false,
            fail_tx_on_receive: false,
            downlinks: VecDeque::new(),
        }
    }
}

impl RadioPort for MockRadio {
    fn init(&mut self, _settings: &RadioSettings) -> Result<(), RadioError> {
        Ok(())
    }

    fn device_eui(&self) -> [u8; 8] {
        [0x70, 0xB3, 0xD5, 0xFF, 0xFE, 0x49, 0x9A, 0x01]
    }

    fn join(&mut self, request: &JoinRequest) -> Result<(), RadioError> {
        self.join_requests.push(*request);
        Ok(())
    }

    fn has_joined(&mut self) -> bool {
        if self.polls >= self.polls_until_joined {
            return true;
        }
        self.polls += 1;
        false
    }

    fn open_socket(&mut self, data_rate: u8, confirmed: bool) -> Result<(), RadioError> {
        self.socket = Some((data_rate, confirmed));
        Ok(())
    }

    fn subscribe(&mut self, events: &'static RadioEvents) {
        self.events = Some(events);
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if self.reject_send {
            return Err(RadioError::SendFailed);
        }
        self.sent.push(payload.to_vec());
        let event = if std::mem::take(&mut self.fail_next_tx) {
            RadioEvent::TxFailed
        } else {
            RadioEvent::TxPacket
        };
        if let Some(queue) = self.events {
            events::post(queue, event);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Downlink>, RadioError> {
        if std::mem::take(&mut self.fail_tx_on_receive) {
            self.raise(RadioEvent::TxFailed);
        }
        Ok(self.downlinks.pop_front())
    }
}

// ── System and delay ──────────────────────────────────────────

pub struct MockSystem {
    pub clock: Clock,
    pub watchdog_ms: Option<u32>,
    pub feeds: u32,
    pub restarts: Vec<RestartReason>,
}

impl SystemPort for MockSystem {
    fn arm_watchdog(&mut self, timeout_ms: u32) {
        self.watchdog_ms = Some(timeout_ms);
    }

    fn feed_watchdog(&mut self) {
        self.feeds += 1;
    }

    fn restart(&mut self, reason: RestartReason) {
        self.restarts.push(reason);
    }

    fn uptime_ms(&self) -> u64 {
        self.clock.get() / 1_000_000
    }
}

pub struct MockDelay {
    pub clock: Clock,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.set(self.clock.get() + u64::from(ns));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.set(self.clock.get() + u64::from(ms) * 1_000_000);
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<NodeEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &NodeEvent) {
        self.events.push(event.clone());
    }
}

// ── Platform ──────────────────────────────────────────────────

pub struct TestPlatform;

impl Platform for TestPlatform {
    type Sensors = MockSensors;
    type Radio = MockRadio;
    type Store = NvsAdapter;
    type System = MockSystem;
    type Delay = MockDelay;
    type Sink = RecordingSink;
}

pub type TestNode = NodeController<TestPlatform>;

/// Upper bound on ticks for any single wait in a test.
const MAX_TICKS: usize = 200_000;

#[allow(dead_code)]
pub fn node() -> TestNode {
    node_with(NvsAdapter::new().expect("in-memory NVS"), MockSensors::default())
}

pub fn node_with(store: NvsAdapter, sensors: MockSensors) -> TestNode {
    let clock: Clock = Rc::new(Cell::new(0));
    let hw = Peripherals::<TestPlatform> {
        sensors,
        radio: MockRadio::default(),
        store,
        system: MockSystem {
            clock: clock.clone(),
            watchdog_ms: None,
            feeds: 0,
            restarts: Vec::new(),
        },
        delay: MockDelay { clock },
        sink: RecordingSink::default(),
    };
    let events: &'static RadioEvents = Box::leak(Box::new(RadioEvents::new()));
    NodeController::new(hw, events)
}

/// Tick until `done` holds. Panics if it never does.
pub fn tick_until(node: &mut TestNode, mut done: impl FnMut(&TestNode) -> bool) {
    for _ in 0..MAX_TICKS {
        if done(node) {
            return;
        }
        node.tick();
    }
    panic!("condition not reached; state {:?}", node.state());
}

#[allow(dead_code)]
pub fn connect(node: &mut TestNode) {
    tick_until(node, |n| n.state() == StateId::Connected);
}

/// Run until `n` more cycles have completed or the node has stopped.
#[allow(dead_code)]
pub fn run_cycles(node: &mut TestNode, n: u64) {
    let target = node.node_state().cycles_completed + n;
    tick_until(node, |node| {
        node.state() == StateId::Fatal || node.node_state().cycles_completed >= target
    });
}

#[allow(dead_code)]
pub fn restarts(node: &TestNode) -> &[RestartReason] {
    &node.peripherals().system.restarts
}
