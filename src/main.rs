mod bluetooth;
mod config;
mod control;
mod database;
mod gpio;
mod metrics;
mod models;
mod state;
mod store;
mod utils;

use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use bluetooth::scanner::listen_for_beacons;
use config::{config_path, watch_config, AppConfig};
use gpio::{FanSwitch, SimulatedFan};
use metrics::run_metrics_export;
use state::{on_off, AppState, SharedState};

/// Decide, switch the relay and read back the sensed fan state, forever
async fn control_loop(state: SharedState, config: watch::Receiver<AppConfig>, fan: &mut impl FanSwitch) {
    let mut period = config.borrow().control_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // One snapshot of the config per tick, reloads swap the whole value
        let current = config.borrow().clone();
        if current.control_interval != period {
            period = current.control_interval;
            ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let mut guard = state.write().await;
        let decision = guard.tick(&current.fan, OffsetDateTime::now_utc());
        fan.set_fan(decision.should_be_on);
        guard.set_fan_sensed(fan.read_fan_sense());
    }
}

/// Log a one-line summary of averages and the current decision
async fn status_loop(state: SharedState, config: watch::Receiver<AppConfig>) {
    loop {
        let period = config.borrow().status_interval;
        tokio::time::sleep(period).await;

        let fan = config.borrow().fan;
        let status = state.read().await.status(&fan, OffsetDateTime::now_utc());
        for sensor in &status.sensors {
            info!(
                "{:<8} DP: {:6.1}, Temp: {:5.1}°C, Humidity: {:5.1}% ({} samples)",
                sensor.name, sensor.dew_point, sensor.temperature, sensor.humidity, sensor.samples
            );
        }
        info!(
            "Diff DP: {:6.1} - Fan should be {} ({}) - override: {}",
            status.dew_point_diff,
            on_off(status.venting),
            status.reason_text,
            status.overridden
        );
        match status.to_json() {
            Ok(json) => debug!("Status: {}", json),
            Err(e) => warn!("Failed to render status: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging, RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let path = config_path();
    let config = match AppConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration from {}: {}", path.display(), e);
            return Err(e.into());
        }
    };
    info!("Starting dew point fan controller");
    config.log_summary();

    let state = AppState::shared(config.store_capacity, config.remote_override);
    info!(
        "Keeping the last {} readings per sensor",
        state.read().await.stores.inside.capacity()
    );
    let database_url = config.database_url.clone();
    let metrics_interval = config.metrics_interval;
    let (config_tx, config_rx) = watch::channel(config);

    tokio::spawn(watch_config(path, config_tx, state.clone()));
    tokio::spawn(status_loop(state.clone(), config_rx.clone()));
    match database_url {
        Some(url) => {
            tokio::spawn(run_metrics_export(state.clone(), url, metrics_interval));
        }
        None => info!("DATABASE_URL not set, metrics export disabled"),
    }

    // The relay handle comes back when the control task is stopped
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let control = tokio::spawn({
        let state = state.clone();
        let config_rx = config_rx.clone();
        async move {
            let mut fan = SimulatedFan::new();
            tokio::select! {
                _ = control_loop(state, config_rx, &mut fan) => {}
                _ = stop_rx => {}
            }
            fan
        }
    });

    // Run the listener until it fails or we are interrupted
    tokio::select! {
        result = listen_for_beacons(state.clone(), config_rx) => {
            match result {
                Ok(_) => warn!("Beacon listener stopped"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Ctrl+C received... Exiting");
        }
    }

    // Leave the fan off on the way out
    let _ = stop_tx.send(());
    match control.await {
        Ok(mut fan) => fan.set_fan(false),
        Err(e) => error!("Control task failed: {}", e),
    }

    Ok(())
}
