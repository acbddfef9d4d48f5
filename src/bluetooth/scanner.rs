/// Bluetooth Low Energy listening for ThermoBeacon advertisements
use bluer::{Adapter, AdapterEvent, Address};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::bluetooth::decoder::{try_decode, BEACON_NAME};
use crate::config::AppConfig;
use crate::models::SensorReading;
use crate::state::SharedState;
use crate::utils::format_uptime;

/// Read the current advertisement of one device
///
/// # Returns
/// Some((payload, rssi)) for a ThermoBeacon carrying manufacturer data
async fn read_advertisement(adapter: &Adapter, addr: Address) -> bluer::Result<Option<(Vec<u8>, i16)>> {
    let device = adapter.device(addr)?;

    if device.name().await?.as_deref() != Some(BEACON_NAME) {
        return Ok(None);
    }

    let payload = match device.manufacturer_data().await? {
        Some(manufacturer_data) => manufacturer_data.into_values().next(),
        None => None,
    };

    match payload {
        Some(payload) => {
            let rssi = device.rssi().await?.unwrap_or(0);
            Ok(Some((payload, rssi)))
        }
        None => Ok(None),
    }
}

fn log_reading(reading: &SensorReading) {
    info!(
        "{:>8} Temp: {:.1}°C - Hum: {:.1}% - Bat: {} - RSSI: {} - Uptime: {}",
        reading.role_name(),
        reading.temperature,
        reading.humidity,
        reading.battery_level,
        reading.rssi,
        format_uptime(reading.uptime)
    );
}

/// Listen for beacon advertisements and record the configured sensors
///
/// Runs until the discovery stream ends or the adapter fails. Every
/// advertisement change of a ThermoBeacon is decoded with the sensor
/// identities current at that moment; readings from unknown addresses are
/// dropped.
///
/// # Arguments
/// * `state` - Shared state receiving resolved readings
/// * `config` - Live configuration, read for the sensor identities
pub async fn listen_for_beacons(
    state: SharedState,
    config: watch::Receiver<AppConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    // Low Energy only, and report repeated advertisements so every
    // measurement update reaches us
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: true,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let mut events = match adapter.discover_devices_with_changes().await {
        Ok(stream) => Box::pin(stream),
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };

    info!("Listening for {} advertisements on {}", BEACON_NAME, adapter.name());

    while let Some(event) = events.next().await {
        let AdapterEvent::DeviceAdded(addr) = event else {
            continue;
        };

        let (payload, rssi) = match read_advertisement(&adapter, addr).await {
            Ok(Some(advertisement)) => advertisement,
            Ok(None) => continue,
            Err(e) => {
                debug!("Failed to read advertisement of {}: {}", addr, e);
                continue;
            }
        };

        let sensors = config.borrow().sensors.clone();
        let Some(reading) = try_decode(&payload, rssi, &sensors, OffsetDateTime::now_utc()) else {
            continue;
        };

        if reading.role.is_none() {
            debug!("Ignoring unconfigured beacon {}", reading.mac_address);
            continue;
        }

        log_reading(&reading);
        state.write().await.record(reading);
    }

    warn!("Device discovery stream ended");
    Ok(())
}
