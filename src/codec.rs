//! Uplink payload encoding.
//!
//! Fixed 28-byte little-endian frame, no header, no length prefix, no CRC:
//!
//! ```text
//! off  len  type  field
//!  0    2   i16   temperature  °C  × 100
//!  2    2   i16   humidity     %   × 100
//!  4    4   f32   CO2          ppm
//!  8    4   f32   tVOC         ppb
//! 12    4   f32   eCO2         ppm
//! 16    2   i16   PM1          µg/m³ × 10
//! 18    2   i16   PM2.5        µg/m³ × 10
//! 20    2   i16   PM4          µg/m³ × 10
//! 22    2   i16   PM10         µg/m³ × 10
//! 24    2   u16   VOC baseline
//! 26    2   u16   CO2eq baseline
//! ```
//!
//! A channel with no reading carries [`SENTINEL`] before scaling. Scaled
//! values are truncated toward zero and then wrapped to 16 bits, so the
//! sentinel itself shows up as `16860` in the ×100 slots and `-31082` in
//! the ×10 slots. Out-of-range readings wrap the same way.

use crate::fsm::context::MeasurementSample;
use crate::sensors::BaselinePair;

/// Encoded uplink length.
pub const UPLINK_LEN: usize = 28;

/// Placeholder for a channel with no reading.
pub const SENTINEL: f32 = 9999.0;

/// Placeholder for a baseline that could not be read back.
pub const SENTINEL_BASELINE: u16 = 9999;

const CLIMATE_SCALE: f32 = 100.0;
const PM_SCALE: f32 = 10.0;

pub type UplinkPayload = [u8; UPLINK_LEN];

/// Encode one sample and the current baseline.
pub fn encode(sample: &MeasurementSample, baseline: BaselinePair) -> UplinkPayload {
    let mut w = FrameWriter::new();
    w.put_scaled(sample.temperature_c, CLIMATE_SCALE);
    w.put_scaled(sample.humidity_pct, CLIMATE_SCALE);
    w.put_f32(sample.co2_ppm);
    w.put_f32(sample.tvoc_ppb);
    w.put_f32(sample.eco2_ppm);
    w.put_scaled(sample.pm1, PM_SCALE);
    w.put_scaled(sample.pm2_5, PM_SCALE);
    w.put_scaled(sample.pm4, PM_SCALE);
    w.put_scaled(sample.pm10, PM_SCALE);
    w.put_u16(baseline.voc);
    w.put_u16(baseline.co2eq);
    w.finish()
}

/// The reading, or the sentinel when it is missing or NaN.
fn reading(value: Option<f32>) -> f32 {
    value.filter(|v| !v.is_nan()).unwrap_or(SENTINEL)
}

/// `value × scale`, truncated to i32 then wrapped to i16.
fn scaled_i16(value: f32, scale: f32) -> i16 {
    (value * scale) as i32 as i16
}

struct FrameWriter {
    buf: UplinkPayload,
    pos: usize,
}

impl FrameWriter {
    fn new() -> Self {
        Self {
            buf: [0u8; UPLINK_LEN],
            pos: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_scaled(&mut self, value: Option<f32>, scale: f32) {
        let v = scaled_i16(reading(value), scale);
        self.put(&v.to_le_bytes());
    }

    fn put_f32(&mut self, value: Option<f32>) {
        self.put(&reading(value).to_le_bytes());
    }

    fn put_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    fn finish(self) -> UplinkPayload {
        debug_assert_eq!(self.pos, UPLINK_LEN);
        self.buf
    }
}
