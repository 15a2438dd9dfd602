use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Base date used for all chart timestamps
pub const BASE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2024, 1, 1) {
    Some(date) => date,
    None => panic!("Invalid base date"),
};

/// Base midnight datetime (`BASE_DATE` at 00:00:00)
pub const BASE_MIDNIGHT: NaiveDateTime = match BASE_DATE.and_hms_opt(0, 0, 0) {
    Some(dt) => dt,
    None => panic!("Invalid base midnight"),
};

/// Times of day before this belong to the previous operating day
pub const OPERATING_DAY_START: NaiveTime = match NaiveTime::from_hms_opt(4, 0, 0) {
    Some(time) => time,
    None => panic!("Invalid operating day start"),
};

/// Largest magnitude accepted by `time::add`
pub const ONE_DAY: Duration = Duration::seconds(86_400);

/// Default upper bound for `time::diff` between two times of the same day,
/// overridden by `Settings::max_same_day_gap_secs`
pub const DEFAULT_MAX_SAME_DAY_GAP: Duration = Duration::seconds(8 * 3600);

/// Fraction of the scheduled running time a train needs at least
pub const DEFAULT_MINIMUM_TRAVEL_TIME_RATIO: f64 = 0.9;

/// How far ahead of "now" trains are picked up for projection
pub const DEFAULT_PREDICTION_INTERVAL: Duration = Duration::seconds(7200);

/// Absolute tolerance applied to client supplied line window bounds
pub const POSITION_EPSILON: f64 = 1e-9;
