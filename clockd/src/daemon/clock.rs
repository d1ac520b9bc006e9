use chrono::Timelike;
use clock_proto::ClockReading;

use super::config::TimeZone;

/// Source of the host's wall-clock time of day
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> ClockReading;
}

/// The system clock, read through chrono in the configured time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock {
    zone: TimeZone,
}

impl HostClock {
    pub fn new(zone: TimeZone) -> Self {
        HostClock { zone }
    }
}

impl WallClock for HostClock {
    fn now(&self) -> ClockReading {
        match self.zone {
            TimeZone::Local => reading_of(&chrono::Local::now()),
            TimeZone::Utc => reading_of(&chrono::Utc::now()),
        }
    }
}

fn reading_of(time: &impl Timelike) -> ClockReading {
    // chrono reports a leap second as second 59 with extra nanoseconds
    ClockReading::new(
        time.hour().into(),
        time.minute().into(),
        time.second().min(59).into(),
    )
    .unwrap_or(ClockReading::MIDNIGHT)
}

/// A wall clock that stands still until told otherwise
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct FixedClock(pub std::sync::Arc<std::sync::Mutex<ClockReading>>);

#[cfg(test)]
impl FixedClock {
    pub fn at(reading: ClockReading) -> Self {
        FixedClock(std::sync::Arc::new(std::sync::Mutex::new(reading)))
    }

    pub fn set(&self, reading: ClockReading) {
        *self.0.lock().unwrap() = reading;
    }
}

#[cfg(test)]
impl WallClock for FixedClock {
    fn now(&self) -> ClockReading {
        *self.0.lock().unwrap()
    }
}
