//! Sensor subsystem: the three Sensirion devices on one I2C bus, aggregated
//! by [`SensorArray`].
//!
//! Register-level protocols live in the driver implementations of
//! [`IaqSensor`], [`Co2Sensor`] and [`ParticulateSensor`]. The array owns
//! the bus and lends it to each driver per call, so all three share one
//! peripheral without interior mutability.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::SensorPort;
use crate::error::SensorError;

/// SGP30 (tVOC / eCO2).
pub const SGP30_ADDR: u8 = 0x58;
/// SCD30 (CO2 / temperature / humidity).
pub const SCD30_ADDR: u8 = 0x61;
/// SPS30 (particulate matter).
pub const SPS30_ADDR: u8 = 0x69;

/// Devices that must acknowledge for the bus to count as healthy.
pub const EXPECTED_DEVICES: usize = 3;

/// SCD30 continuous-measurement period.
pub const CO2_MEASUREMENT_INTERVAL_SECS: u16 = 2;

/// Pause between sensor stages so each device settles before the next
/// transaction.
pub const SENSOR_SETTLE_MS: u32 = 200;

/// Valid 7-bit addresses probed by [`scan_bus`].
const SCAN_RANGE: core::ops::Range<u8> = 0x08..0x78;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// SGP30 baseline compensation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaselinePair {
    pub voc: u16,
    pub co2eq: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IaqReading {
    pub tvoc_ppb: f32,
    pub eco2_ppm: f32,
}

/// Any channel may be NaN while the SCD30 has no fresh data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Co2Reading {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Mass concentrations in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmReading {
    pub pm1: f32,
    pub pm2_5: f32,
    pub pm4: f32,
    pub pm10: f32,
}

// ---------------------------------------------------------------------------
// Driver traits
// ---------------------------------------------------------------------------

/// VOC / eCO2 sensor with a writable baseline.
pub trait IaqSensor<B> {
    fn init(&mut self, bus: &mut B) -> Result<(), SensorError>;
    fn measure(&mut self, bus: &mut B) -> Result<IaqReading, SensorError>;
    fn baseline(&mut self, bus: &mut B) -> Result<BaselinePair, SensorError>;
    fn set_baseline(&mut self, bus: &mut B, baseline: BaselinePair) -> Result<(), SensorError>;
}

/// NDIR CO2 sensor with on-board temperature and humidity.
pub trait Co2Sensor<B> {
    fn start_continuous(&mut self, bus: &mut B, interval_secs: u16) -> Result<(), SensorError>;
    fn read(&mut self, bus: &mut B) -> Result<Co2Reading, SensorError>;
}

/// Optical particulate sensor.
pub trait ParticulateSensor<B> {
    fn start(&mut self, bus: &mut B) -> Result<(), SensorError>;
    fn read(&mut self, bus: &mut B) -> Result<PmReading, SensorError>;
}

// ---------------------------------------------------------------------------
// Bus presence
// ---------------------------------------------------------------------------

/// Count the devices that acknowledge an empty write.
pub fn scan_bus<B: I2c>(bus: &mut B) -> usize {
    SCAN_RANGE.filter(|&addr| bus.write(addr, &[]).is_ok()).count()
}

// ---------------------------------------------------------------------------
// Sensor array
// ---------------------------------------------------------------------------

/// Owns the shared bus and one driver per sensor.
pub struct SensorArray<B, V, C, P> {
    bus: B,
    iaq: V,
    co2: C,
    pm: P,
}

impl<B, V, C, P> SensorArray<B, V, C, P>
where
    B: I2c,
    V: IaqSensor<B>,
    C: Co2Sensor<B>,
    P: ParticulateSensor<B>,
{
    pub fn new(bus: B, iaq: V, co2: C, pm: P) -> Self {
        Self { bus, iaq, co2, pm }
    }
}

impl<B, V, C, P> SensorPort for SensorArray<B, V, C, P>
where
    B: I2c,
    V: IaqSensor<B>,
    C: Co2Sensor<B>,
    P: ParticulateSensor<B>,
{
    fn start(&mut self, delay: &mut impl DelayNs) -> Result<(), SensorError> {
        let iaq = self.iaq.init(&mut self.bus);
        if let Err(e) = iaq {
            warn!("SGP30 init failed: {}", e);
        }
        delay.delay_ms(SENSOR_SETTLE_MS);

        let co2 = self
            .co2
            .start_continuous(&mut self.bus, CO2_MEASUREMENT_INTERVAL_SECS);
        if let Err(e) = co2 {
            warn!("SCD30 start failed: {}", e);
        }
        delay.delay_ms(SENSOR_SETTLE_MS);

        let pm = self.pm.start(&mut self.bus);
        if let Err(e) = pm {
            warn!("SPS30 start failed: {}", e);
        }
        delay.delay_ms(SENSOR_SETTLE_MS);

        debug!("sensor start-up sequence complete");
        iaq.and(co2).and(pm)
    }

    fn responding_devices(&mut self) -> usize {
        scan_bus(&mut self.bus)
    }

    fn set_iaq_baseline(&mut self, baseline: BaselinePair) -> Result<(), SensorError> {
        self.iaq.set_baseline(&mut self.bus, baseline)
    }

    fn iaq_baseline(&mut self) -> Result<BaselinePair, SensorError> {
        self.iaq.baseline(&mut self.bus)
    }

    fn read_iaq(&mut self) -> Result<IaqReading, SensorError> {
        self.iaq.measure(&mut self.bus)
    }

    fn read_co2(&mut self) -> Result<Co2Reading, SensorError> {
        self.co2.read(&mut self.bus)
    }

    fn read_particulates(&mut self) -> Result<PmReading, SensorError> {
        self.pm.read(&mut self.bus)
    }
}
