/// Periodic export of averaged readings
use log::{error, info};
use time::OffsetDateTime;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::database::store_metrics;
use crate::state::SharedState;
use crate::store::SensorStores;
use crate::utils::round_to;

/// Both histories need this many readings before a row is exported
pub const MIN_SAMPLES: usize = 10;

/// One exported data point
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub time: OffsetDateTime,
    pub temp_i: f64,
    pub temp_o: f64,
    pub dewpoint_i: f64,
    pub dewpoint_o: f64,
    pub hum_i: f64,
    pub hum_o: f64,
    pub vent_val: i32,
}

impl MetricsRow {
    /// Build a row from the store averages
    ///
    /// # Returns
    /// None while either store holds fewer than [`MIN_SAMPLES`] readings
    pub fn from_stores(stores: &SensorStores, venting: bool, now: OffsetDateTime) -> Option<Self> {
        if stores.inside.size() < MIN_SAMPLES || stores.outside.size() < MIN_SAMPLES {
            return None;
        }

        Some(Self {
            time: now,
            temp_i: round_to(stores.inside.average_temperature(), 2),
            temp_o: round_to(stores.outside.average_temperature(), 2),
            dewpoint_i: round_to(stores.inside.average_dew_point(), 2),
            dewpoint_o: round_to(stores.outside.average_dew_point(), 2),
            hum_i: round_to(stores.inside.average_humidity(), 2),
            hum_o: round_to(stores.outside.average_humidity(), 2),
            vent_val: i32::from(venting),
        })
    }
}

/// Export a row every `period` until the task is dropped
pub async fn run_metrics_export(state: SharedState, database_url: String, period: Duration) {
    info!("Exporting metrics every {} seconds", period.as_secs());
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let row = {
            let state = state.read().await;
            info!(
                "Sending average values: {} inside, {} outside samples",
                state.stores.inside.size(),
                state.stores.outside.size()
            );
            MetricsRow::from_stores(&state.stores, state.decision.should_be_on, OffsetDateTime::now_utc())
        };

        let Some(row) = row else {
            info!("Not enough samples yet, skipping export");
            continue;
        };

        info!(
            "Inside  (T/H/DP): {:5.1}C - {:5.1}% - {:5.1}C",
            row.temp_i, row.hum_i, row.dewpoint_i
        );
        info!(
            "Outside (T/H/DP): {:5.1}C - {:5.1}% - {:5.1}C",
            row.temp_o, row.hum_o, row.dewpoint_o
        );

        if let Err(e) = store_metrics(&row, &database_url).await {
            error!("Failed to store metrics: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, SensorReading};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00:00 UTC);

    fn fill(stores: &mut SensorStores, role: Role, count: usize, temperature: f64) {
        for i in 0..count {
            stores.for_role_mut(role).append(SensorReading {
                mac_address: String::new(),
                role: Some(role),
                battery_level: 0,
                rssi: 0,
                uptime: i as u32,
                temperature,
                humidity: 50.0 + i as f64,
                dew_point: temperature - 10.0,
                scanned: NOW,
            });
        }
    }

    #[test]
    fn no_row_until_both_stores_have_enough_samples() {
        let mut stores = SensorStores::new(20);
        fill(&mut stores, Role::Inside, 10, 21.0);
        fill(&mut stores, Role::Outside, 9, 5.0);
        assert!(MetricsRow::from_stores(&stores, true, NOW).is_none());

        fill(&mut stores, Role::Outside, 1, 5.0);
        assert!(MetricsRow::from_stores(&stores, true, NOW).is_some());
    }

    #[test]
    fn row_carries_rounded_averages_and_vent_flag() {
        let mut stores = SensorStores::new(20);
        fill(&mut stores, Role::Inside, 12, 21.0);
        fill(&mut stores, Role::Outside, 10, 5.0);

        let row = MetricsRow::from_stores(&stores, false, NOW).unwrap();
        assert_eq!(row.time, NOW);
        assert_eq!(row.temp_i, 21.0);
        assert_eq!(row.temp_o, 5.0);
        assert_eq!(row.dewpoint_i, 11.0);
        assert_eq!(row.dewpoint_o, -5.0);
        assert_eq!(row.hum_i, 55.5);
        assert_eq!(row.hum_o, 54.5);
        assert_eq!(row.vent_val, 0);

        let row = MetricsRow::from_stores(&stores, true, NOW).unwrap();
        assert_eq!(row.vent_val, 1);
    }
}
