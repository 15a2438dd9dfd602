use std::time::Instant;

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::Serialize;
use crate::settings::ClockSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    Running,
    Fixed,
}

impl ClockState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Fixed => "fixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub state: ClockState,
    pub timestamp: NaiveDateTime,
}

impl ClockReading {
    #[must_use]
    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }
}

/// Source of the operating time
pub trait Clock: Send + Sync {
    fn now(&self) -> ClockReading;
}

/// Wall clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ClockReading {
        ClockReading { state: ClockState::Running, timestamp: Local::now().naive_local() }
    }
}

/// Always reports the same instant
#[derive(Debug)]
pub struct FixedClock {
    timestamp: NaiveDateTime,
}

impl FixedClock {
    #[must_use]
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self { timestamp }
    }

    /// Today at `time`
    #[must_use]
    pub fn at(time: NaiveTime) -> Self {
        Self::new(Local::now().date_naive().and_time(time))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> ClockReading {
        ClockReading { state: ClockState::Fixed, timestamp: self.timestamp }
    }
}

/// Simulated session time: starts at a configured instant and advances in
/// real time
#[derive(Debug)]
pub struct OffsetClock {
    start: NaiveDateTime,
    started: Instant,
}

impl OffsetClock {
    #[must_use]
    pub fn new(start: NaiveDateTime) -> Self {
        Self { start, started: Instant::now() }
    }

    /// Today at `time`
    #[must_use]
    pub fn starting_at(time: NaiveTime) -> Self {
        Self::new(Local::now().date_naive().and_time(time))
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> ClockReading {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap_or_default();
        ClockReading { state: ClockState::Running, timestamp: self.start + elapsed }
    }
}

/// Clock described by the settings
#[must_use]
pub fn from_settings(settings: &ClockSettings) -> Box<dyn Clock> {
    match settings {
        ClockSettings::System => Box::new(SystemClock),
        ClockSettings::Fixed { time } => Box::new(FixedClock::at(*time)),
        ClockSettings::Offset { start } => Box::new(OffsetClock::starting_at(*start)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(timestamp(14, 10));
        let reading = clock.now();
        assert_eq!(reading.state, ClockState::Fixed);
        assert_eq!(reading.time(), NaiveTime::from_hms_opt(14, 10, 0).expect("valid time"));
        assert_eq!(clock.now(), reading);
    }

    #[test]
    fn test_offset_clock_advances_from_start() {
        let clock = OffsetClock::new(timestamp(14, 10));
        let reading = clock.now();
        assert_eq!(reading.state, ClockState::Running);
        assert!(reading.timestamp >= timestamp(14, 10));
        assert!(reading.timestamp < timestamp(14, 11));
    }

    #[test]
    fn test_from_settings() {
        let time = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
        let clock = from_settings(&ClockSettings::Fixed { time });
        assert_eq!(clock.now().time(), time);
        assert_eq!(from_settings(&ClockSettings::System).now().state, ClockState::Running);
        assert_eq!(ClockState::Fixed.as_str(), "fixed");
    }
}
