use std::fmt;
use time::OffsetDateTime;

/// Logical position of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Inside,
    Outside,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Inside => "Inside",
            Role::Outside => "Outside",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded beacon advertisement
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub mac_address: String,
    pub role: Option<Role>,
    pub battery_level: u16,
    pub rssi: i16,
    pub uptime: u32,
    pub temperature: f64,
    pub humidity: f64,
    pub dew_point: f64,
    pub scanned: OffsetDateTime,
}

impl SensorReading {
    /// Role name, empty when the address matched no configured sensor
    pub fn role_name(&self) -> &'static str {
        self.role.map(|role| role.name()).unwrap_or("")
    }
}

/// Offsets added to the converted raw values of one sensor
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorCalibration {
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorIdentity {
    pub mac_address: String,
    pub calibration: SensorCalibration,
}

/// The two configured sensors, looked up in this order when decoding
#[derive(Debug, Clone, PartialEq)]
pub struct SensorIdentities {
    pub inside: SensorIdentity,
    pub outside: SensorIdentity,
}

impl SensorIdentities {
    /// Resolve a rendered address to its role and calibration, inside first
    pub fn resolve(&self, mac_address: &str) -> Option<(Role, SensorCalibration)> {
        if mac_address == self.inside.mac_address {
            Some((Role::Inside, self.inside.calibration))
        } else if mac_address == self.outside.mac_address {
            Some((Role::Outside, self.outside.calibration))
        } else {
            None
        }
    }
}

/// Thresholds driving the fan decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanConfig {
    /// Minimum dew point difference (°C) that justifies venting
    pub min_diff: f64,
    /// Band (°C) above `min_diff` required before switching on
    pub hysteresis: f64,
    pub min_humidity_inside: f64,
    pub min_temp_inside: f64,
    pub min_temp_outside: f64,
}

/// Why the fan decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reason {
    #[default]
    None,
    NoData,
    NotEnoughData,
    DewPointOverHysteresis,
    DewPointUnderHysteresis,
    DewPointInBetween,
    InsideTempTooLow,
    OutsideTempTooLow,
    InsideHumidityTooLow,
    SoftOverrideOn,
    SoftOverrideOff,
    Unknown,
}

impl Reason {
    /// Short operator-facing description
    pub fn name(&self) -> &'static str {
        match self {
            Reason::None => "none",
            Reason::NoData => "no data",
            Reason::NotEnoughData => "not enough data",
            Reason::DewPointOverHysteresis => "dp > hysteresis",
            Reason::DewPointUnderHysteresis => "dp < hysteresis",
            Reason::DewPointInBetween => "dp in between",
            Reason::InsideTempTooLow => "inside temp too low",
            Reason::OutsideTempTooLow => "outside temp too low",
            Reason::InsideHumidityTooLow => "inside hum too low",
            Reason::SoftOverrideOn => "soft override on",
            Reason::SoftOverrideOff => "soft override off",
            Reason::Unknown => "unknown reason",
        }
    }

    /// Stable numeric code reported in the status snapshot
    pub fn code(&self) -> u8 {
        match self {
            Reason::None => 0,
            Reason::NoData => 1,
            Reason::NotEnoughData => 2,
            Reason::DewPointOverHysteresis => 3,
            Reason::DewPointUnderHysteresis => 4,
            Reason::DewPointInBetween => 5,
            Reason::InsideTempTooLow => 6,
            Reason::OutsideTempTooLow => 7,
            Reason::InsideHumidityTooLow => 8,
            Reason::SoftOverrideOn => 9,
            Reason::SoftOverrideOff => 10,
            Reason::Unknown => 11,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Manual fan override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Override {
    #[default]
    None,
    On,
    Off,
}

impl Override {
    /// Parse the integer wire form: 0 none, 1 on, any other positive value off
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Override::On,
            c if c > 1 => Override::Off,
            _ => Override::None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Override::None => 0,
            Override::On => 1,
            Override::Off => 2,
        }
    }
}

/// Outcome of one decision tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FanDecision {
    pub should_be_on: bool,
    /// Sensed fan state, filled in by the actuation side
    pub is_on: bool,
    pub reason: Reason,
    /// Inside minus outside dew point of the readings the decision used
    pub dew_point_diff: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identities() -> SensorIdentities {
        SensorIdentities {
            inside: SensorIdentity {
                mac_address: "AA:AA:AA:AA:AA:AA".to_string(),
                calibration: SensorCalibration {
                    temperature: 0.5,
                    humidity: 1.0,
                },
            },
            outside: SensorIdentity {
                mac_address: "BB:BB:BB:BB:BB:BB".to_string(),
                calibration: SensorCalibration {
                    temperature: -0.5,
                    humidity: -1.0,
                },
            },
        }
    }

    #[test]
    fn resolve_matches_each_role() {
        let ids = identities();
        assert_eq!(
            ids.resolve("AA:AA:AA:AA:AA:AA").map(|(role, _)| role),
            Some(Role::Inside)
        );
        let (role, cal) = ids.resolve("BB:BB:BB:BB:BB:BB").unwrap();
        assert_eq!(role, Role::Outside);
        assert_eq!(cal.temperature, -0.5);
        assert!(ids.resolve("CC:CC:CC:CC:CC:CC").is_none());
    }

    #[test]
    fn resolve_prefers_inside_when_misconfigured() {
        let mut ids = identities();
        ids.outside.mac_address = ids.inside.mac_address.clone();
        let (role, cal) = ids.resolve("AA:AA:AA:AA:AA:AA").unwrap();
        assert_eq!(role, Role::Inside);
        assert_eq!(cal.temperature, 0.5);
    }

    #[test]
    fn resolve_is_case_sensitive() {
        assert!(identities().resolve("aa:aa:aa:aa:aa:aa").is_none());
    }

    #[test]
    fn override_codes() {
        assert_eq!(Override::from_code(0), Override::None);
        assert_eq!(Override::from_code(-3), Override::None);
        assert_eq!(Override::from_code(1), Override::On);
        assert_eq!(Override::from_code(2), Override::Off);
        assert_eq!(Override::from_code(7), Override::Off);
        assert_eq!(Override::Off.code(), 2);
    }

    #[test]
    fn reason_names_and_codes_are_distinct() {
        let all = [
            Reason::None,
            Reason::NoData,
            Reason::NotEnoughData,
            Reason::DewPointOverHysteresis,
            Reason::DewPointUnderHysteresis,
            Reason::DewPointInBetween,
            Reason::InsideTempTooLow,
            Reason::OutsideTempTooLow,
            Reason::InsideHumidityTooLow,
            Reason::SoftOverrideOn,
            Reason::SoftOverrideOff,
            Reason::Unknown,
        ];
        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.code() as usize, i);
            for b in &all[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
        assert_eq!(Reason::DewPointInBetween.to_string(), "dp in between");
    }
}
