/// Fan decision: turns the latest readings into an on/off signal and a reason
use time::{Duration, OffsetDateTime};

use crate::models::{FanConfig, FanDecision, Override, Reason, SensorReading};

/// Readings older than this no longer count as current
pub const STALE_AFTER: Duration = Duration::minutes(5);

/// Everything a decision depends on besides configuration and the previous result
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    /// Latest inside reading, None until the first one arrived
    pub inside: Option<&'a SensorReading>,
    /// Latest outside reading, None until the first one arrived
    pub outside: Option<&'a SensorReading>,
    pub remote_override: Override,
    pub now: OffsetDateTime,
}

/// Compute the next fan decision from the previous one
///
/// Rules are checked in priority order and the first match wins:
/// 1. Manual override
/// 2. A reading is missing
/// 3. A reading is older than [`STALE_AFTER`]
/// 4. Inside temperature below minimum
/// 5. Outside temperature below minimum
/// 6. Inside humidity below minimum
/// 7. Dew point difference against `min_diff` and `min_diff + hysteresis`
///
/// Inside the hysteresis band the previous `should_be_on` is kept, so a
/// difference hovering around one threshold cannot toggle the fan. `is_on`
/// is carried over unchanged; the actuation side refreshes it.
pub fn decide(inputs: &DecisionInputs<'_>, config: &FanConfig, previous: &FanDecision) -> FanDecision {
    let dew_point_diff = match (inputs.inside, inputs.outside) {
        (Some(inside), Some(outside)) => Some(inside.dew_point - outside.dew_point),
        _ => None,
    };
    let decision = |should_be_on: bool, reason: Reason| FanDecision {
        should_be_on,
        is_on: previous.is_on,
        reason,
        dew_point_diff,
    };

    match inputs.remote_override {
        Override::On => return decision(true, Reason::SoftOverrideOn),
        Override::Off => return decision(false, Reason::SoftOverrideOff),
        Override::None => {}
    }

    let (inside, outside) = match (inputs.inside, inputs.outside) {
        (Some(inside), Some(outside)) => (inside, outside),
        _ => return decision(false, Reason::NoData),
    };

    let oldest_allowed = inputs.now - STALE_AFTER;
    if inside.scanned < oldest_allowed || outside.scanned < oldest_allowed {
        return decision(false, Reason::NotEnoughData);
    }

    if inside.temperature < config.min_temp_inside {
        return decision(false, Reason::InsideTempTooLow);
    }
    if outside.temperature < config.min_temp_outside {
        return decision(false, Reason::OutsideTempTooLow);
    }
    if inside.humidity < config.min_humidity_inside {
        return decision(false, Reason::InsideHumidityTooLow);
    }

    let delta = inside.dew_point - outside.dew_point;
    let switch_on_at = config.min_diff + config.hysteresis;
    if delta < config.min_diff {
        decision(false, Reason::DewPointUnderHysteresis)
    } else if delta >= switch_on_at {
        decision(true, Reason::DewPointOverHysteresis)
    } else if delta >= config.min_diff && delta < switch_on_at {
        // direction of travel through the band is unknown, hold the output
        decision(previous.should_be_on, Reason::DewPointInBetween)
    } else {
        // NaN dew points end up here
        decision(false, Reason::Unknown)
    }
}
