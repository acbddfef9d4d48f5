/// Shared service state: histories, latest readings and the current decision
use log::info;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::control::{decide, DecisionInputs};
use crate::models::{FanConfig, FanDecision, Override, Role, SensorReading};
use crate::store::{RollingSensorStore, SensorStores};
use crate::utils::{format_datetime, round_to, seconds_since};

pub type SharedState = Arc<RwLock<AppState>>;

#[derive(Debug)]
pub struct AppState {
    pub stores: SensorStores,
    pub decision: FanDecision,
    pub remote_override: Override,
}

/// Averages of one sensor as reported to status consumers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SensorSummary {
    pub name: &'static str,
    pub temperature: f64,
    pub humidity: f64,
    pub dew_point: f64,
    pub samples: usize,
    pub last_seen_secs: Option<u64>,
}

/// Point-in-time view of the service for status consumers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSnapshot {
    pub update: String,
    pub sensors: Vec<SensorSummary>,
    pub reason: u8,
    pub reason_text: &'static str,
    pub venting: bool,
    #[serde(rename = "override")]
    pub overridden: bool,
    pub remote_override: i64,
    pub diff_min: f64,
    pub hysteresis: f64,
    pub dew_point_diff: f64,
}

impl StatusSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl AppState {
    pub fn new(store_capacity: i32, remote_override: Override) -> Self {
        Self {
            stores: SensorStores::new(store_capacity),
            decision: FanDecision::default(),
            remote_override,
        }
    }

    pub fn shared(store_capacity: i32, remote_override: Override) -> SharedState {
        Arc::new(RwLock::new(Self::new(store_capacity, remote_override)))
    }

    /// Store a decoded reading under its role
    ///
    /// # Returns
    /// false if the reading has no role and was dropped
    pub fn record(&mut self, reading: SensorReading) -> bool {
        let Some(role) = reading.role else {
            return false;
        };
        self.stores.for_role_mut(role).append(reading);
        true
    }

    /// Run one decision over the latest readings and replace the stored result
    pub fn tick(&mut self, config: &FanConfig, now: OffsetDateTime) -> FanDecision {
        let inputs = DecisionInputs {
            inside: self.latest(Role::Inside),
            outside: self.latest(Role::Outside),
            remote_override: self.remote_override,
            now,
        };
        let next = decide(&inputs, config, &self.decision);

        if next.should_be_on != self.decision.should_be_on || next.reason != self.decision.reason {
            info!(
                "Fan decision: {} -> {} ({})",
                on_off(self.decision.should_be_on),
                on_off(next.should_be_on),
                next.reason
            );
        }

        self.decision = next;
        next
    }

    pub fn set_override(&mut self, remote_override: Override) {
        if remote_override != self.remote_override {
            info!(
                "Remote override changed: {:?} -> {:?}",
                self.remote_override, remote_override
            );
        }
        self.remote_override = remote_override;
    }

    pub fn set_fan_sensed(&mut self, is_on: bool) {
        self.decision.is_on = is_on;
    }

    /// Most recent reading of a sensor, None before the first one arrived
    pub fn latest(&self, role: Role) -> Option<&SensorReading> {
        self.stores.for_role(role).latest()
    }

    pub fn status(&self, config: &FanConfig, now: OffsetDateTime) -> StatusSnapshot {
        let summarize = |role: Role, store: &RollingSensorStore| SensorSummary {
            name: role.name(),
            temperature: round_to(store.average_temperature(), 1),
            humidity: round_to(store.average_humidity(), 1),
            dew_point: round_to(store.average_dew_point(), 1),
            samples: store.size(),
            last_seen_secs: self.latest(role).map(|r| seconds_since(&r.scanned, now)),
        };

        StatusSnapshot {
            update: format_datetime(&now),
            sensors: vec![
                summarize(Role::Inside, &self.stores.inside),
                summarize(Role::Outside, &self.stores.outside),
            ],
            reason: self.decision.reason.code(),
            reason_text: self.decision.reason.name(),
            venting: self.decision.should_be_on,
            overridden: self.decision.should_be_on != self.decision.is_on,
            remote_override: self.remote_override.code(),
            diff_min: config.min_diff,
            hysteresis: config.hysteresis,
            dew_point_diff: round_to(
                self.stores.inside.average_dew_point() - self.stores.outside.average_dew_point(),
                1,
            ),
        }
    }
}

pub fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::decoder::decode_thermobeacon;
    use crate::models::{Reason, SensorCalibration, SensorIdentities, SensorIdentity};
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00:00 UTC);

    fn config() -> FanConfig {
        FanConfig {
            min_diff: 4.0,
            hysteresis: 1.0,
            min_humidity_inside: 40.0,
            min_temp_inside: 10.0,
            min_temp_outside: -10.0,
        }
    }

    fn reading(role: Option<Role>, temperature: f64, humidity: f64, dew_point: f64) -> SensorReading {
        SensorReading {
            mac_address: "AA:BB:CC:DD:EE:FF".to_string(),
            role,
            battery_level: 90,
            rssi: -70,
            uptime: 10,
            temperature,
            humidity,
            dew_point,
            scanned: NOW,
        }
    }

    #[test]
    fn readings_without_role_are_dropped() {
        let mut state = AppState::new(5, Override::None);
        assert!(!state.record(reading(None, 20.0, 50.0, 9.3)));
        assert_eq!(state.stores.inside.size(), 0);
        assert_eq!(state.stores.outside.size(), 0);
        assert!(state.latest(Role::Inside).is_none());
    }

    #[test]
    fn record_updates_store_and_latest() {
        let mut state = AppState::new(5, Override::None);
        assert!(state.record(reading(Some(Role::Outside), 4.0, 80.0, 0.9)));
        assert!(state.record(reading(Some(Role::Outside), 6.0, 80.0, 2.8)));
        assert_eq!(state.stores.outside.size(), 2);
        assert_eq!(state.latest(Role::Outside).map(|r| r.temperature), Some(6.0));
        assert!(state.latest(Role::Inside).is_none());
    }

    #[test]
    fn tick_uses_latest_readings_not_averages() {
        let mut state = AppState::new(5, Override::None);
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 5.0));
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 12.0));
        state.record(reading(Some(Role::Outside), 15.0, 70.0, 7.0));

        let decision = state.tick(&config(), NOW);
        assert!(decision.should_be_on);
        assert_eq!(decision.reason, Reason::DewPointOverHysteresis);
        assert_eq!(state.decision, decision);
    }

    #[test]
    fn tick_threads_previous_state_through_the_band() {
        let mut state = AppState::new(5, Override::None);
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 12.0));
        state.record(reading(Some(Role::Outside), 15.0, 70.0, 7.0));
        assert!(state.tick(&config(), NOW).should_be_on);

        // difference drops to 4.5, inside the band, fan stays on
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 11.5));
        let decision = state.tick(&config(), NOW);
        assert!(decision.should_be_on);
        assert_eq!(decision.reason, Reason::DewPointInBetween);

        // below the band it switches off and stays off back inside the band
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 10.0));
        assert!(!state.tick(&config(), NOW).should_be_on);
        state.record(reading(Some(Role::Inside), 21.0, 55.0, 11.5));
        assert!(!state.tick(&config(), NOW).should_be_on);
    }

    #[test]
    fn override_and_sensed_state_show_up_in_status() {
        let mut state = AppState::new(5, Override::None);
        state.set_override(Override::On);
        state.tick(&config(), NOW);
        state.set_fan_sensed(false);

        let status = state.status(&config(), NOW);
        assert!(status.venting);
        assert!(status.overridden);
        assert_eq!(status.remote_override, 1);
        assert_eq!(status.reason, Reason::SoftOverrideOn.code());
        assert_eq!(status.reason_text, "soft override on");
    }

    #[test]
    fn status_reports_averages() {
        let mut state = AppState::new(5, Override::None);
        state.record(reading(Some(Role::Inside), 20.5, 50.0, 9.8));
        state.record(reading(Some(Role::Inside), 22.0, 52.0, 11.8));
        state.record(reading(Some(Role::Inside), 25.5, 54.0, 15.5));
        let mut old = reading(Some(Role::Outside), 5.0, 90.0, 3.5);
        old.scanned = NOW - Duration::seconds(42);
        state.record(old);

        let status = state.status(&config(), NOW);
        let inside = &status.sensors[0];
        assert_eq!(inside.name, "Inside");
        assert_eq!(inside.temperature, 22.7);
        assert_eq!(inside.humidity, 52.0);
        assert_eq!(inside.samples, 3);
        assert_eq!(inside.last_seen_secs, Some(0));
        let outside = &status.sensors[1];
        assert_eq!(outside.last_seen_secs, Some(42));
        assert_eq!(status.dew_point_diff, round_to(12.366_666_666_666_667 - 3.5, 1));
        assert_eq!(status.diff_min, 4.0);
        assert_eq!(status.update, "01.06.2024 - 12:00:00");
    }

    #[test]
    fn status_serializes_to_json() {
        let state = AppState::new(5, Override::None);
        let json = state.status(&config(), NOW).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["override"], serde_json::Value::Bool(false));
        assert_eq!(value["reason_text"], "none");
        assert_eq!(value["sensors"][1]["name"], "Outside");
        assert!(value["sensors"][0]["last_seen_secs"].is_null());
    }

    #[tokio::test]
    async fn decoded_beacons_drive_the_fan_decision() {
        let identities = SensorIdentities {
            inside: SensorIdentity {
                mac_address: "BC:9A:78:56:34:12".to_string(),
                calibration: SensorCalibration::default(),
            },
            outside: SensorIdentity {
                mac_address: "56:34:12:EF:CD:AB".to_string(),
                calibration: SensorCalibration::default(),
            },
        };
        let payload = |mac: [u8; 6], temp: f64, hum: f64| {
            let mut p = [0u8; 18];
            p[2..8].copy_from_slice(&mac);
            p[10..12].copy_from_slice(&((temp * 16.0) as u16).to_le_bytes());
            p[12..14].copy_from_slice(&((hum * 16.0) as u16).to_le_bytes());
            p
        };

        let shared = AppState::shared(20, Override::None);
        {
            let mut state = shared.write().await;
            // 21 °C / 70 % inside, 10 °C / 60 % outside
            let inside = decode_thermobeacon(
                &payload([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], 21.0, 70.0),
                -55,
                &identities,
                NOW,
            );
            let outside = decode_thermobeacon(
                &payload([0xAB, 0xCD, 0xEF, 0x12, 0x34, 0x56], 10.0, 60.0),
                -80,
                &identities,
                NOW,
            );
            assert!(state.record(inside));
            assert!(state.record(outside));
            state.tick(&config(), NOW + Duration::seconds(5));
        }

        let state = shared.read().await;
        // dew points 15.3 and 2.6
        assert_eq!(state.decision.dew_point_diff.map(|d| round_to(d, 1)), Some(12.7));
        assert!(state.decision.should_be_on);
        assert_eq!(state.decision.reason, Reason::DewPointOverHysteresis);
    }
}
