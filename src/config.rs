use log::{error, info};
use std::collections::HashMap;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;

use crate::models::{FanConfig, Override, SensorCalibration, SensorIdentities, SensorIdentity};
use crate::state::SharedState;
use crate::metrics::MIN_SAMPLES;
use crate::store::{DEFAULT_CAPACITY, MAX_CAPACITY};

/// Config file read when CONFIG_FILE is not set
pub const DEFAULT_CONFIG_FILE: &str = ".env";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("{key} = {value} is out of range, must be between {min} and {max}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid MAC address '{0}', expected the form AA:BB:CC:DD:EE:FF")]
    InvalidMac(String),
    #[error("inside and outside sensor share the address {0}")]
    DuplicateMac(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] dotenv::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub sensors: SensorIdentities,
    pub fan: FanConfig,
    pub remote_override: Override,
    pub store_capacity: i32,
    pub control_interval: Duration,
    pub status_interval: Duration,
    pub metrics_interval: Duration,
    pub reload_interval: Duration,
    /// Metrics export is disabled when unset
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Load from the config file, falling back to the process environment
    ///
    /// Keys in the file win over environment variables so that edits to the
    /// file take effect on reload. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_values = read_config_file(path)?;
        Self::from_lookup(|key| {
            file_values
                .get(key)
                .cloned()
                .or_else(|| env::var(key).ok())
        })
    }

    /// Build and validate a configuration from a key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let inside_mac = parse_mac(&lookup, "INSIDE_MAC")?;
        let outside_mac = parse_mac(&lookup, "OUTSIDE_MAC")?;
        if inside_mac == outside_mac {
            return Err(ConfigError::DuplicateMac(inside_mac));
        }

        let sensors = SensorIdentities {
            inside: SensorIdentity {
                mac_address: inside_mac,
                calibration: SensorCalibration {
                    temperature: optional_f64(&lookup, "INSIDE_TEMPERATURE_CALIBRATION", 0.0)?,
                    humidity: optional_f64(&lookup, "INSIDE_HUMIDITY_CALIBRATION", 0.0)?,
                },
            },
            outside: SensorIdentity {
                mac_address: outside_mac,
                calibration: SensorCalibration {
                    temperature: optional_f64(&lookup, "OUTSIDE_TEMPERATURE_CALIBRATION", 0.0)?,
                    humidity: optional_f64(&lookup, "OUTSIDE_HUMIDITY_CALIBRATION", 0.0)?,
                },
            },
        };

        let fan = FanConfig {
            min_diff: required_f64(&lookup, "FAN_MIN_DIFF", 1.0, 10.0)?,
            hysteresis: required_f64(&lookup, "FAN_HYSTERESIS", 0.1, 5.0)?,
            min_humidity_inside: required_f64(&lookup, "FAN_MIN_HUMIDITY_INSIDE", 30.0, 70.0)?,
            min_temp_inside: required_f64(&lookup, "FAN_MIN_TEMP_INSIDE", 10.0, 40.0)?,
            min_temp_outside: required_f64(&lookup, "FAN_MIN_TEMP_OUTSIDE", -20.0, 20.0)?,
        };

        let remote_override = match lookup("FAN_OVERRIDE") {
            Some(value) => Override::from_code(parse_value("FAN_OVERRIDE", &value)?),
            None => Override::None,
        };

        // Below MIN_SAMPLES the metrics export could never fill its window
        let store_capacity = bounded(
            &lookup,
            "STORE_CAPACITY",
            DEFAULT_CAPACITY,
            MIN_SAMPLES as i32,
            MAX_CAPACITY,
        )?;

        Ok(AppConfig {
            sensors,
            fan,
            remote_override,
            store_capacity,
            control_interval: interval_secs(&lookup, "CONTROL_INTERVAL_SECS", 5, 1, 60)?,
            status_interval: interval_secs(&lookup, "STATUS_INTERVAL_SECS", 60, 3, 3600)?,
            metrics_interval: interval_secs(&lookup, "METRICS_INTERVAL_SECS", 60, 10, 3600)?,
            reload_interval: interval_secs(&lookup, "CONFIG_RELOAD_SECS", 10, 1, 3600)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        })
    }

    pub fn log_summary(&self) {
        for (name, sensor) in [("Inside", &self.sensors.inside), ("Outside", &self.sensors.outside)] {
            info!(
                "{:<8} sensor: MAC {} - Temp cal = {:.2} - Humidity cal = {:.2}",
                name,
                sensor.mac_address,
                sensor.calibration.temperature,
                sensor.calibration.humidity
            );
        }
        info!(
            "Fan: min diff {:.1}°C, hysteresis {:.1}°C, min inside humidity {:.0}%, min temp inside {:.1}°C / outside {:.1}°C",
            self.fan.min_diff,
            self.fan.hysteresis,
            self.fan.min_humidity_inside,
            self.fan.min_temp_inside,
            self.fan.min_temp_outside
        );
        info!(
            "Metrics export: {}",
            if self.database_url.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
    }
}

/// Path of the config file, from CONFIG_FILE or the default
pub fn config_path() -> PathBuf {
    env::var("CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenv::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenv::Error::Io(e)) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut values = HashMap::new();
    for item in iter {
        let (key, value) = item?;
        values.insert(key, value);
    }
    Ok(values)
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_mac<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or(ConfigError::Missing(key))?;
    let mac = value.trim().to_uppercase();
    let well_formed = mac.len() == 17
        && mac.split(':').count() == 6
        && mac
            .split(':')
            .all(|group| group.len() == 2 && group.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed {
        return Err(ConfigError::InvalidMac(value));
    }
    Ok(mac)
}

fn required_f64<F>(lookup: &F, key: &'static str, min: f64, max: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f64 = parse_value(key, &lookup(key).ok_or(ConfigError::Missing(key))?)?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn optional_f64<F>(lookup: &F, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn bounded<T, F>(lookup: &F, key: &'static str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Copy + Into<f64>,
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(key) {
        Some(value) => parse_value(key, &value)?,
        None => default,
    };
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(value)
}

fn interval_secs<F>(
    lookup: &F,
    key: &'static str,
    default: u32,
    min: u32,
    max: u32,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = bounded(lookup, key, default, min, max)?;
    Ok(Duration::from_secs(u64::from(secs)))
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// Reload the configuration whenever the config file changes
///
/// The whole configuration is validated before it replaces the current one
/// in a single send; a broken file keeps the previous configuration active.
pub async fn watch_config(path: PathBuf, tx: watch::Sender<AppConfig>, state: SharedState) {
    let mut last_modified = modified_at(&path).await;

    loop {
        let period = tx.borrow().reload_interval;
        tokio::time::sleep(period).await;

        let modified = modified_at(&path).await;
        if modified == last_modified {
            continue;
        }
        last_modified = modified;

        info!("Config file changed: {}", path.display());
        reload(&path, &tx, &state).await;
    }
}

/// Load the config file and swap it in if it is valid
///
/// # Returns
/// false if the file was rejected and the previous configuration kept
async fn reload(path: &Path, tx: &watch::Sender<AppConfig>, state: &SharedState) -> bool {
    match AppConfig::load(path) {
        Ok(config) => {
            config.log_summary();
            if config.store_capacity != tx.borrow().store_capacity {
                info!("STORE_CAPACITY changes take effect after a restart");
            }
            state.write().await.set_override(config.remote_override);
            tx.send_replace(config);
            true
        }
        Err(e) => {
            error!("Keeping previous configuration, reload failed: {}", e);
            false
        }
    }
}
