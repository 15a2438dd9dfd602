use chrono::{Duration, NaiveTime, Timelike};
use crate::constants::{BASE_DATE, BASE_MIDNIGHT, DEFAULT_MAX_SAME_DAY_GAP, ONE_DAY};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("duration of {0} seconds exceeds one day")]
    InvalidDuration(i64),
    #[error("{later} is not within {max_gap_secs}s after {earlier}")]
    OutOfRange {
        later: NaiveTime,
        earlier: NaiveTime,
        max_gap_secs: i64,
    },
}

/// Whether an addition crossed midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    None,
    NextDay,
    PreviousDay,
}

/// Result of `add`: the new time of day and whether it wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSum {
    pub time: NaiveTime,
    pub rollover: Rollover,
}

impl TimeSum {
    #[must_use]
    pub fn wrapped(&self) -> bool {
        self.rollover != Rollover::None
    }
}

/// Add a duration to a time of day, wrapping past midnight.
///
/// # Errors
///
/// Returns `TimeError::InvalidDuration` if the duration is longer than a day
/// in either direction.
pub fn add(time: NaiveTime, duration: Duration) -> Result<TimeSum, TimeError> {
    if duration.abs() > ONE_DAY {
        return Err(TimeError::InvalidDuration(duration.num_seconds()));
    }

    let (time, wrapped_secs) = time.overflowing_add_signed(duration);
    let rollover = match wrapped_secs.signum() {
        1 => Rollover::NextDay,
        -1 => Rollover::PreviousDay,
        _ => Rollover::None,
    };

    Ok(TimeSum { time, rollover })
}

/// Duration from `earlier` to `later` on the same day, bounded by
/// `DEFAULT_MAX_SAME_DAY_GAP`.
///
/// # Errors
///
/// See `diff_within`.
pub fn diff(later: NaiveTime, earlier: NaiveTime) -> Result<Duration, TimeError> {
    diff_within(later, earlier, DEFAULT_MAX_SAME_DAY_GAP)
}

/// Duration from `earlier` to `later` on the same day. No midnight rollover
/// is inferred.
///
/// # Errors
///
/// Returns `TimeError::OutOfRange` if `later` is before `earlier` or more than
/// `max_gap` after it.
pub fn diff_within(later: NaiveTime, earlier: NaiveTime, max_gap: Duration) -> Result<Duration, TimeError> {
    let gap = later.signed_duration_since(earlier);
    if gap < Duration::zero() || gap > max_gap {
        return Err(TimeError::OutOfRange {
            later,
            earlier,
            max_gap_secs: max_gap.num_seconds(),
        });
    }
    Ok(gap)
}

/// Convert a time of day to seconds since `BASE_MIDNIGHT`.
///
/// Times before `day_start` belong to the operating day that started the
/// previous evening, so they are placed on the following calendar day.
#[must_use]
pub fn time_to_timestamp(time: NaiveTime, day_start: NaiveTime) -> i64 {
    let mut datetime = BASE_DATE.and_time(time);
    if time < day_start {
        datetime += ONE_DAY;
    }
    datetime.signed_duration_since(BASE_MIDNIGHT).num_seconds()
}

/// Inverse of `time_to_timestamp`, discarding the day
#[must_use]
pub fn timestamp_to_time(timestamp: i64) -> Option<NaiveTime> {
    let seconds = u32::try_from(timestamp.rem_euclid(ONE_DAY.num_seconds())).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
}

/// Scale a duration, rounding to whole seconds
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    Duration::seconds((duration.num_seconds() as f64 * factor).round() as i64)
}

/// Parse a time string in HH:MM:SS format
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a valid time in HH:MM:SS format.
pub fn parse_time_hms(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
}

/// Parse a time string in HH:MM:SS or HH:MM format
///
/// # Errors
///
/// Returns an error if the string matches neither format.
pub fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    parse_time_hms(s).or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
}

/// Format an optional time the way timetable tables print it
#[must_use]
pub fn format_time_opt(time: Option<NaiveTime>) -> String {
    time.map_or_else(|| "None".to_string(), |t| {
        format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
    })
}
