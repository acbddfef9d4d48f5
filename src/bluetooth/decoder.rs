/// ThermoBeacon advertisement decoding
use log::debug;
use time::OffsetDateTime;

use crate::models::{SensorCalibration, SensorIdentities, SensorReading};
use crate::utils::{dew_point, round_to};

/// Local name advertised by the beacons we listen to
pub const BEACON_NAME: &str = "ThermoBeacon";

/// Length of the manufacturer payload carrying a measurement
pub const PAYLOAD_LEN: usize = 18;

// Field offsets inside the manufacturer payload
const MAC_OFFSET: usize = 2;
const BATTERY_OFFSET: usize = 8;
const TEMPERATURE_OFFSET: usize = 10;
const HUMIDITY_OFFSET: usize = 12;
const UPTIME_OFFSET: usize = 14;

/// Render a little-endian address as `AA:BB:CC:DD:EE:FF`
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .rev()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn read_u16(payload: &[u8; PAYLOAD_LEN], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn read_u32(payload: &[u8; PAYLOAD_LEN], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Convert the beacon's 1/16 fixed-point value, folding values above 4000
/// back below zero
fn convert_fixed_point(raw: u16) -> f64 {
    let scaled = raw as f64 / 16.0;
    if scaled > 4000.0 {
        scaled - 4096.0
    } else {
        scaled
    }
}

/// Decode a ThermoBeacon manufacturer payload into a reading
///
/// Payload layout (all fields little-endian):
/// - Bytes 2-7: Device address, least significant byte first
/// - Bytes 8-9: Battery level
/// - Bytes 10-11: Temperature (1/16 °C)
/// - Bytes 12-13: Relative humidity (1/16 %)
/// - Bytes 14-17: Seconds since the device was reset
///
/// The calibration of the sensor whose address matches is added before
/// rounding to one decimal; the dew point is computed from the rounded
/// values. An address matching neither sensor yields a reading without role
/// and without calibration.
pub fn decode_thermobeacon(
    payload: &[u8; PAYLOAD_LEN],
    rssi: i16,
    sensors: &SensorIdentities,
    now: OffsetDateTime,
) -> SensorReading {
    let mac_address = format_mac(&payload[MAC_OFFSET..MAC_OFFSET + 6]);

    let (role, calibration) = match sensors.resolve(&mac_address) {
        Some((role, calibration)) => (Some(role), calibration),
        None => (None, SensorCalibration::default()),
    };

    let temperature = round_to(
        convert_fixed_point(read_u16(payload, TEMPERATURE_OFFSET)) + calibration.temperature,
        1,
    );
    let humidity = round_to(
        convert_fixed_point(read_u16(payload, HUMIDITY_OFFSET)) + calibration.humidity,
        1,
    );

    SensorReading {
        mac_address,
        role,
        battery_level: read_u16(payload, BATTERY_OFFSET),
        rssi,
        uptime: read_u32(payload, UPTIME_OFFSET),
        temperature,
        humidity,
        dew_point: dew_point(temperature, humidity),
        scanned: now,
    }
}

/// Decode a payload of unchecked length
///
/// # Returns
/// Some(SensorReading) if the payload has exactly the expected length, None otherwise
pub fn try_decode(
    data: &[u8],
    rssi: i16,
    sensors: &SensorIdentities,
    now: OffsetDateTime,
) -> Option<SensorReading> {
    match <&[u8; PAYLOAD_LEN]>::try_from(data) {
        Ok(payload) => Some(decode_thermobeacon(payload, rssi, sensors, now)),
        Err(_) => {
            debug!("Ignoring advertisement payload of {} bytes", data.len());
            None
        }
    }
}
