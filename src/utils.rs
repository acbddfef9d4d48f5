/// Utility functions for measurement math and formatting
use time::{format_description, OffsetDateTime};

/// Largest "last seen" figure reported, in seconds
const MAX_LAST_SEEN_SECS: u64 = 9999;

/// Round a value to `precision` decimal places
///
/// Multiplies by 10^precision, rounds half away from zero and divides back.
/// Infinite and NaN values pass through unchanged.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Calculate the dew point (°C) from temperature (°C) and relative humidity (%)
///
/// Uses the Magnus formula with the coefficient pair selected by the sign of
/// the temperature. The result is rounded to one decimal place. A humidity of
/// zero yields negative infinity.
pub fn dew_point(temperature: f64, humidity: f64) -> f64 {
    let (a, b) = if temperature >= 0.0 {
        (7.5, 237.3)
    } else {
        (7.6, 240.7)
    };

    // Saturation vapor pressure in hPa
    let sdd = 6.1078 * 10f64.powf((a * temperature) / (b + temperature));

    // Vapor pressure in hPa
    let dd = sdd * (humidity / 100.0);

    let v = (dd / 6.1078).log10();

    round_to((b * v) / (a - v), 1)
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Render a device uptime as "Xd Yh Zm"
pub fn format_uptime(seconds: u32) -> String {
    let days = seconds / (24 * 3600);
    let hours = (seconds % (24 * 3600)) / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// Convert a time::Duration to seconds as u64, negative durations become 0
pub fn duration_to_seconds(duration: time::Duration) -> u64 {
    duration.whole_seconds().max(0) as u64
}

/// Seconds elapsed between `then` and `now`, capped for display
pub fn seconds_since(then: &OffsetDateTime, now: OffsetDateTime) -> u64 {
    duration_to_seconds(now - *then).min(MAX_LAST_SEEN_SECS)
}
