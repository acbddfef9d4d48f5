/// Fan relay access
use log::info;

/// Switches the fan relay and reads back whether the fan runs
pub trait FanSwitch: Send {
    fn set_fan(&mut self, on: bool);
    fn read_fan_sense(&self) -> bool;
}

/// Relay stand-in for hosts without fan wiring
///
/// Logs every switch and reports the last commanded state as sensed.
#[derive(Debug, Default)]
pub struct SimulatedFan {
    on: bool,
}

impl SimulatedFan {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FanSwitch for SimulatedFan {
    fn set_fan(&mut self, on: bool) {
        if on != self.on {
            info!("Switching fan {}", if on { "on" } else { "off" });
        }
        self.on = on;
    }

    fn read_fan_sense(&self) -> bool {
        self.on
    }
}
