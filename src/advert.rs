//! Beacon advertisement decoding for Lampyris
//!
//! The monitored beacon broadcasts its manufacturer data as a hex-character
//! string: a fixed type tag, battery percentage, cumulative pulse counter and
//! an instantaneous rate counter. This module turns that payload into
//! physical units using the meter's pulses-per-kWh calibration constant.

use crate::error::{LampyrisError, Result};

/// Manufacturer/type tag expected at the head of every payload
pub const MANUFACTURER_TAG: &str = "9005";

const TAG_END: usize = 4;
const BATTERY_END: usize = 6;
const COUNTER_END: usize = 14;

/// Tag + battery + counter + at least one rate character
const MIN_PAYLOAD_CHARS: usize = 15;

/// Rate counter is at most 64 bits on the wire
const MAX_RATE_CHARS: usize = 16;

/// One decoded beacon reading in physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    /// Battery percentage reported by the beacon
    pub battery: u8,

    /// Cumulative energy since meter installation in kWh
    pub cumulative_kwh: f64,

    /// Instantaneous power in kW
    pub rate_kw: f64,
}

/// Decode a raw manufacturer-data payload into a meter reading
///
/// The payload layout is `9005` (tag), two hex chars of battery, eight hex
/// chars of cumulative pulse counter, and the remaining hex chars as the
/// rate counter. Counters convert to kWh/kW by dividing by `imp_per_kwh`.
pub fn decode_advertisement(payload: &str, imp_per_kwh: u32) -> Result<MeterReading> {
    if imp_per_kwh == 0 {
        return Err(LampyrisError::validation(
            "imp_per_kwh",
            "Calibration constant must be greater than 0",
        ));
    }

    if !payload.is_ascii() {
        return Err(LampyrisError::malformed_payload(
            "Payload contains non-ASCII characters",
        ));
    }

    if payload.len() < MIN_PAYLOAD_CHARS {
        return Err(LampyrisError::malformed_payload(format!(
            "Payload too short: {} chars, expected at least {}",
            payload.len(),
            MIN_PAYLOAD_CHARS
        )));
    }

    let tag = &payload[..TAG_END];
    if tag != MANUFACTURER_TAG {
        return Err(LampyrisError::malformed_payload(format!(
            "Unexpected manufacturer tag: {}",
            tag
        )));
    }

    let battery = u8::from_str_radix(&payload[TAG_END..BATTERY_END], 16).map_err(|e| {
        LampyrisError::malformed_payload(format!("Invalid battery field: {}", e))
    })?;

    let counter = u32::from_str_radix(&payload[BATTERY_END..COUNTER_END], 16).map_err(|e| {
        LampyrisError::malformed_payload(format!("Invalid counter field: {}", e))
    })?;

    let rate_field = &payload[COUNTER_END..];
    if rate_field.len() > MAX_RATE_CHARS {
        return Err(LampyrisError::malformed_payload(format!(
            "Rate field too long: {} chars",
            rate_field.len()
        )));
    }
    let rate = u64::from_str_radix(rate_field, 16)
        .map_err(|e| LampyrisError::malformed_payload(format!("Invalid rate field: {}", e)))?;

    let imp = f64::from(imp_per_kwh);
    Ok(MeterReading {
        battery,
        cumulative_kwh: f64::from(counter) / imp,
        rate_kw: rate as f64 / imp,
    })
}
