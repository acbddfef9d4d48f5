/// Bounded per-sensor reading history
use std::collections::VecDeque;

use crate::models::{Role, SensorReading};

/// Smallest window a store will keep, whatever is requested
pub const MIN_CAPACITY: usize = 5;

/// Window size used when none is configured
pub const DEFAULT_CAPACITY: i32 = 20;

/// Largest window accepted from configuration
pub const MAX_CAPACITY: i32 = 1000;

/// FIFO of the most recent readings of one sensor
///
/// Appending to a full store evicts the oldest reading. The averages are
/// plain arithmetic means over everything held and return 0 for an empty
/// store, so callers have to check `size()` to tell "no data" from zero.
#[derive(Debug, Clone)]
pub struct RollingSensorStore {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl RollingSensorStore {
    pub fn new(max_entries: i32) -> Self {
        let capacity = usize::try_from(max_entries)
            .unwrap_or(0)
            .max(MIN_CAPACITY);
        Self {
            readings: VecDeque::new(),
            capacity,
        }
    }

    pub fn append(&mut self, reading: SensorReading) {
        if self.readings.len() >= self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn average_temperature(&self) -> f64 {
        self.average(|r| r.temperature)
    }

    pub fn average_humidity(&self) -> f64 {
        self.average(|r| r.humidity)
    }

    pub fn average_dew_point(&self) -> f64 {
        self.average(|r| r.dew_point)
    }

    pub fn size(&self) -> usize {
        self.readings.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently appended reading
    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    /// Readings oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter()
    }

    fn average<F>(&self, value: F) -> f64
    where
        F: Fn(&SensorReading) -> f64,
    {
        if self.readings.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.iter().map(value).sum();
        sum / self.readings.len() as f64
    }
}

/// One store per sensor role
#[derive(Debug, Clone)]
pub struct SensorStores {
    pub inside: RollingSensorStore,
    pub outside: RollingSensorStore,
}

impl SensorStores {
    pub fn new(max_entries: i32) -> Self {
        Self {
            inside: RollingSensorStore::new(max_entries),
            outside: RollingSensorStore::new(max_entries),
        }
    }

    pub fn for_role(&self, role: Role) -> &RollingSensorStore {
        match role {
            Role::Inside => &self.inside,
            Role::Outside => &self.outside,
        }
    }

    pub fn for_role_mut(&mut self, role: Role) -> &mut RollingSensorStore {
        match role {
            Role::Inside => &mut self.inside,
            Role::Outside => &mut self.outside,
        }
    }
}
