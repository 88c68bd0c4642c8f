//! Host simulation of the sensor bus and the LoRaWAN radio.
//!
//! Lets the node binary run on a development machine:
//! - [`SimBus`]: an I2C bus where devices acknowledge according to the
//!   scenario (occasional dropouts, or a device that vanished).
//! - [`SimSgp30`], [`SimScd30`], [`SimSps30`]: drivers producing slowly
//!   wandering indoor readings. The SCD30 has no data on its first read.
//! - [`SimRadio`]: joins after a few polls, posts TX/RX events to the
//!   controller's queue, can lose uplinks and replays scripted downlinks.
//!
//! The scenario is chosen with `IAQNODE_SIM_SCENARIO`.

use std::collections::VecDeque;
use std::fmt;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::{debug, info};

use super::device_id::{eui64_from_mac, MacAddress};
use super::log_sink::LogEventSink;
use super::nvs::NvsAdapter;
use super::system::DeviceSystem;
use super::time::SystemDelay;
use crate::app::ports::{Downlink, JoinRequest, LinkStats, Platform, RadioPort};
use crate::config::RadioSettings;
use crate::error::{RadioError, SensorError};
use crate::events::{self, RadioEvent, RadioEvents};
use crate::sensors::{
    BaselinePair, Co2Reading, Co2Sensor, IaqReading, IaqSensor, ParticulateSensor, PmReading,
    SensorArray, SCD30_ADDR, SGP30_ADDR, SPS30_ADDR,
};

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Everything works.
    Healthy,
    /// Devices miss an acknowledge now and then.
    FlakyBus,
    /// The particulate sensor is unplugged; the node restarts after four cycles.
    MissingSensor,
    /// One uplink in five is lost after retries.
    LossyLink,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "flaky" | "flaky-bus" => Self::FlakyBus,
            "missing" | "missing-sensor" => Self::MissingSensor,
            "lossy" | "lossy-link" => Self::LossyLink,
            _ => Self::Healthy,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("IAQNODE_SIM_SCENARIO")
            .map(|s| Self::from_str_lossy(&s))
            .unwrap_or(Self::Healthy)
    }

    fn nack_probability(self) -> f32 {
        match self {
            Self::FlakyBus => 0.05,
            _ => 0.0,
        }
    }

    fn tx_fail_probability(self) -> f32 {
        match self {
            Self::LossyLink => 0.2,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::FlakyBus => write!(f, "flaky-bus"),
            Self::MissingSensor => write!(f, "missing-sensor"),
            Self::LossyLink => write!(f, "lossy-link"),
        }
    }
}

// ---------------------------------------------------------------------------
// I2C bus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

impl embedded_hal::i2c::Error for SimBusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

pub struct SimBus {
    present: Vec<u8>,
    nack_probability: f32,
}

impl SimBus {
    pub fn new(present: &[u8], nack_probability: f32) -> Self {
        Self {
            present: present.to_vec(),
            nack_probability,
        }
    }

    pub fn for_scenario(scenario: Scenario) -> Self {
        let present: &[u8] = match scenario {
            Scenario::MissingSensor => &[SGP30_ADDR, SCD30_ADDR],
            _ => &[SGP30_ADDR, SCD30_ADDR, SPS30_ADDR],
        };
        Self::new(present, scenario.nack_probability())
    }
}

impl ErrorType for SimBus {
    type Error = SimBusError;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if !self.present.contains(&address) || fastrand::f32() < self.nack_probability {
            return Err(SimBusError);
        }
        for op in operations.iter_mut() {
            if let Operation::Read(buf) = op {
                buf.fill(0);
            }
        }
        Ok(())
    }
}

fn probe<B: I2c>(bus: &mut B, addr: u8) -> Result<(), SensorError> {
    bus.write(addr, &[]).map_err(|_| SensorError::NotResponding)
}

/// Random walk with mean reversion, clamped to `[lo, hi]`.
fn wander(value: f32, center: f32, step: f32, lo: f32, hi: f32) -> f32 {
    let noise = (fastrand::f32() - 0.5) * 2.0 * step;
    (value + noise + (center - value) * 0.05).clamp(lo, hi)
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

pub struct SimSgp30 {
    tvoc: f32,
    eco2: f32,
    baseline: BaselinePair,
}

impl Default for SimSgp30 {
    fn default() -> Self {
        Self {
            tvoc: 40.0,
            eco2: 450.0,
            baseline: BaselinePair {
                voc: 0x8F2A,
                co2eq: 0x8C4E,
            },
        }
    }
}

impl<B: I2c> IaqSensor<B> for SimSgp30 {
    fn init(&mut self, bus: &mut B) -> Result<(), SensorError> {
        probe(bus, SGP30_ADDR)
    }

    fn measure(&mut self, bus: &mut B) -> Result<IaqReading, SensorError> {
        probe(bus, SGP30_ADDR)?;
        self.tvoc = wander(self.tvoc, 40.0, 6.0, 0.0, 60_000.0);
        self.eco2 = wander(self.eco2, 450.0, 15.0, 400.0, 60_000.0);
        Ok(IaqReading {
            tvoc_ppb: self.tvoc.round(),
            eco2_ppm: self.eco2.round(),
        })
    }

    fn baseline(&mut self, bus: &mut B) -> Result<BaselinePair, SensorError> {
        probe(bus, SGP30_ADDR)?;
        Ok(self.baseline)
    }

    fn set_baseline(&mut self, bus: &mut B, baseline: BaselinePair) -> Result<(), SensorError> {
        probe(bus, SGP30_ADDR)?;
        self.baseline = baseline;
        Ok(())
    }
}

pub struct SimScd30 {
    co2: f32,
    temperature: f32,
    humidity: f32,
    started: bool,
    first_read: bool,
}

impl Default for SimScd30 {
    fn default() -> Self {
        Self {
            co2: 620.0,
            temperature: 22.5,
            humidity: 45.0,
            started: false,
            first_read: true,
        }
    }
}

impl<B: I2c> Co2Sensor<B> for SimScd30 {
    fn start_continuous(&mut self, bus: &mut B, interval_secs: u16) -> Result<(), SensorError> {
        probe(bus, SCD30_ADDR)?;
        debug!("SCD30(sim): continuous measurement every {} s", interval_secs);
        self.started = true;
        Ok(())
    }

    fn read(&mut self, bus: &mut B) -> Result<Co2Reading, SensorError> {
        probe(bus, SCD30_ADDR)?;
        if !self.started {
            return Err(SensorError::NotReady);
        }
        if self.first_read {
            self.first_read = false;
            return Ok(Co2Reading {
                co2_ppm: f32::NAN,
                temperature_c: f32::NAN,
                humidity_pct: f32::NAN,
            });
        }
        self.co2 = wander(self.co2, 620.0, 20.0, 400.0, 10_000.0);
        self.temperature = wander(self.temperature, 22.5, 0.2, -40.0, 70.0);
        self.humidity = wander(self.humidity, 45.0, 0.8, 0.0, 100.0);
        Ok(Co2Reading {
            co2_ppm: self.co2,
            temperature_c: self.temperature,
            humidity_pct: self.humidity,
        })
    }
}

pub struct SimSps30 {
    pm2_5: f32,
    started: bool,
}

impl Default for SimSps30 {
    fn default() -> Self {
        Self {
            pm2_5: 6.0,
            started: false,
        }
    }
}

impl<B: I2c> ParticulateSensor<B> for SimSps30 {
    fn start(&mut self, bus: &mut B) -> Result<(), SensorError> {
        probe(bus, SPS30_ADDR)?;
        self.started = true;
        Ok(())
    }

    fn read(&mut self, bus: &mut B) -> Result<PmReading, SensorError> {
        probe(bus, SPS30_ADDR)?;
        if !self.started {
            return Err(SensorError::NotReady);
        }
        self.pm2_5 = wander(self.pm2_5, 6.0, 0.8, 0.0, 1000.0);
        Ok(PmReading {
            pm1: self.pm2_5 * 0.7,
            pm2_5: self.pm2_5,
            pm4: self.pm2_5 * 1.1,
            pm10: self.pm2_5 * 1.2,
        })
    }
}

pub type SimSensors = SensorArray<SimBus, SimSgp30, SimScd30, SimSps30>;

pub fn sim_sensors(scenario: Scenario) -> SimSensors {
    SensorArray::new(
        SimBus::for_scenario(scenario),
        SimSgp30::default(),
        SimScd30::default(),
        SimSps30::default(),
    )
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

pub struct SimRadio {
    mac: MacAddress,
    settings: Option<RadioSettings>,
    join_after_polls: u32,
    polls: u32,
    join_requested: bool,
    socket_open: bool,
    events: Option<&'static RadioEvents>,
    downlinks: VecDeque<Downlink>,
    tx_fail_probability: f32,
    tx_counter: u32,
}

impl SimRadio {
    pub fn new(mac: MacAddress, scenario: Scenario) -> Self {
        Self {
            mac,
            settings: None,
            join_after_polls: 2,
            polls: 0,
            join_requested: false,
            socket_open: false,
            events: None,
            downlinks: VecDeque::new(),
            tx_fail_probability: scenario.tx_fail_probability(),
            tx_counter: 0,
        }
    }

    /// Queue a downlink for the next receive window.
    pub fn queue_downlink(&mut self, port: u8, data: &[u8]) {
        match heapless::Vec::from_slice(data) {
            Ok(data) => self.downlinks.push_back(Downlink { port, data }),
            Err(()) => log::warn!("SimRadio: downlink of {} bytes dropped", data.len()),
        }
    }

    fn post(&self, event: RadioEvent) {
        if let Some(queue) = self.events {
            if !events::post(queue, event) {
                log::warn!("SimRadio: event queue full, {:?} dropped", event);
            }
        }
    }
}

impl RadioPort for SimRadio {
    fn init(&mut self, settings: &RadioSettings) -> Result<(), RadioError> {
        info!(
            "SimRadio: {:?} {} Hz, class {:?}, ADR {}",
            settings.region,
            settings.frequency_hz,
            settings.device_class,
            if settings.adaptive_data_rate { "on" } else { "off" }
        );
        self.settings = Some(*settings);
        Ok(())
    }

    fn device_eui(&self) -> [u8; 8] {
        eui64_from_mac(&self.mac)
    }

    fn join(&mut self, request: &JoinRequest) -> Result<(), RadioError> {
        if self.settings.is_none() {
            return Err(RadioError::JoinFailed);
        }
        debug!("SimRadio: OTAA join at DR{}", request.data_rate);
        self.join_requested = true;
        self.polls = 0;
        Ok(())
    }

    fn has_joined(&mut self) -> bool {
        if !self.join_requested {
            return false;
        }
        self.polls += 1;
        self.polls > self.join_after_polls
    }

    fn open_socket(&mut self, data_rate: u8, confirmed: bool) -> Result<(), RadioError> {
        if !self.join_requested {
            return Err(RadioError::NotJoined);
        }
        debug!("SimRadio: socket DR{} confirmed={}", data_rate, confirmed);
        self.socket_open = true;
        Ok(())
    }

    fn subscribe(&mut self, events: &'static RadioEvents) {
        self.events = Some(events);
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        if !self.socket_open {
            return Err(RadioError::NotJoined);
        }
        self.tx_counter = self.tx_counter.wrapping_add(1);
        debug!("SimRadio: uplink #{} {:02X?}", self.tx_counter, payload);

        if fastrand::f32() < self.tx_fail_probability {
            self.post(RadioEvent::TxFailed);
        } else {
            self.post(RadioEvent::TxPacket);
            if !self.downlinks.is_empty() {
                self.post(RadioEvent::RxPacket);
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Downlink>, RadioError> {
        if !self.socket_open {
            return Err(RadioError::NotJoined);
        }
        Ok(self.downlinks.pop_front())
    }

    fn stats(&self) -> Option<LinkStats> {
        let dr = self.settings.map_or(0, |s| s.data_rate);
        (self.tx_counter > 0).then(|| LinkStats {
            rssi_dbm: -70 - fastrand::i16(0..30),
            snr_db: 7.5 - fastrand::f32() * 10.0,
            data_rate: dr,
            tx_counter: self.tx_counter,
        })
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Every port backed by the simulation or the host.
pub struct SimPlatform;

impl Platform for SimPlatform {
    type Sensors = SimSensors;
    type Radio = SimRadio;
    type Store = NvsAdapter;
    type System = DeviceSystem;
    type Delay = SystemDelay;
    type Sink = LogEventSink;
}
