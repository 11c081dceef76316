//! Time-of-day and date-time ranges used by the checkpoint filters
//!
//! Both range types are inclusive at both ends. A range whose start is after
//! its end contains nothing, so every containment check against it is false.

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Timestamp format used for parsing and for every log line
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time-of-day format used for parsing and display
pub const TIME_FORMAT: &str = "%H:%M:%S";

const SHORT_TIME_FORMAT: &str = "%H:%M";

/// Separator between the two ends of a range written as a single string
pub const RANGE_SEPARATOR: char = '~';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid timestamp '{0}': expected yyyy-MM-dd HH:mm:ss")]
    InvalidTimestamp(String),
    #[error("invalid time of day '{0}': expected HH:mm:ss")]
    InvalidTime(String),
    #[error("local time '{input}' does not exist in {tz}")]
    NonexistentLocalTime { input: String, tz: Tz },
    #[error("range '{0}' must have the form 'start ~ end'")]
    MalformedRange(String),
}

/// Parse a `yyyy-MM-dd HH:mm:ss` wall-clock timestamp in `tz`.
/// Ambiguous local times resolve to the earliest instant.
pub fn parse_date_time(input: &str, tz: Tz) -> Result<DateTime<Tz>, RangeError> {
    let naive = NaiveDateTime::parse_from_str(input.trim(), DATE_TIME_FORMAT)
        .map_err(|_| RangeError::InvalidTimestamp(input.to_string()))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| RangeError::NonexistentLocalTime {
            input: input.trim().to_string(),
            tz,
        })
}

/// Parse a `HH:mm:ss` (or `HH:mm`) time of day
pub fn parse_time(input: &str) -> Result<NaiveTime, RangeError> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, SHORT_TIME_FORMAT))
        .map_err(|_| RangeError::InvalidTime(input.to_string()))
}

/// Split `"a ~ b"` into its two trimmed, non-empty halves
fn split_pair(input: &str) -> Result<(&str, &str), RangeError> {
    match input.split_once(RANGE_SEPARATOR) {
        Some((start, end)) if !start.trim().is_empty() && !end.trim().is_empty() => {
            Ok((start.trim(), end.trim()))
        }
        _ => Err(RangeError::MalformedRange(input.to_string())),
    }
}

/// A range of wall-clock times without a date, e.g. business hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeOfDayRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeOfDayRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Ok(Self::new(parse_time(start)?, parse_time(end)?))
    }

    /// Parse `"HH:mm:ss ~ HH:mm:ss"`
    pub fn parse_pair(input: &str) -> Result<Self, RangeError> {
        let (start, end) = split_pair(input)?;
        Self::parse(start, end)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains_time(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// `other` lies entirely inside `self`
    pub fn contains_fully(&self, other: &TimeOfDayRange) -> bool {
        !other.is_inverted() && self.contains_time(other.start) && self.contains_time(other.end)
    }

    pub fn contains_start(&self, other: &TimeOfDayRange) -> bool {
        self.contains_time(other.start)
    }

    pub fn contains_end(&self, other: &TimeOfDayRange) -> bool {
        self.contains_time(other.end)
    }
}

impl fmt::Display for TimeOfDayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

/// A range of zoned timestamps: holidays, whitelists and candidate windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateTimeRange {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

impl DateTimeRange {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self { start, end }
    }

    /// Parse two `yyyy-MM-dd HH:mm:ss` wall-clock timestamps in `tz`
    pub fn parse(start: &str, end: &str, tz: Tz) -> Result<Self, RangeError> {
        Ok(Self::new(parse_date_time(start, tz)?, parse_date_time(end, tz)?))
    }

    /// Parse `"yyyy-MM-dd HH:mm:ss ~ yyyy-MM-dd HH:mm:ss"` in `tz`
    pub fn parse_pair(input: &str, tz: Tz) -> Result<Self, RangeError> {
        let (start, end) = split_pair(input)?;
        Self::parse(start, end, tz)
    }

    /// Build a range from UTC instants, expressed in `tz`
    pub fn from_utc(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> Self {
        Self::new(start.with_timezone(&tz), end.with_timezone(&tz))
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains_instant(&self, instant: &DateTime<Tz>) -> bool {
        self.start <= *instant && *instant <= self.end
    }

    /// `other` lies entirely inside `self`
    pub fn contains_fully(&self, other: &DateTimeRange) -> bool {
        !other.is_inverted() && self.contains_instant(&other.start) && self.contains_instant(&other.end)
    }

    pub fn contains_start(&self, other: &DateTimeRange) -> bool {
        self.contains_instant(&other.start)
    }

    pub fn contains_end(&self, other: &DateTimeRange) -> bool {
        self.contains_instant(&other.end)
    }

    /// Both endpoints' clock times lie inside `hours`, whatever their dates
    pub fn time_within(&self, hours: &TimeOfDayRange) -> bool {
        self.start_time_within(hours) && self.end_time_within(hours)
    }

    pub fn start_time_within(&self, hours: &TimeOfDayRange) -> bool {
        hours.contains_time(self.start.time())
    }

    pub fn end_time_within(&self, hours: &TimeOfDayRange) -> bool {
        hours.contains_time(self.end.time())
    }

    /// Distinct weekdays touched by the range, in calendar order from the
    /// start date through the end date
    pub fn weekdays(&self) -> Vec<Weekday> {
        let mut days = vec![self.start.weekday()];
        let last = self.end.date_naive();
        for date in self.start.date_naive().iter_days().skip(1) {
            if date > last || days.len() == 7 {
                break;
            }
            if !days.contains(&date.weekday()) {
                days.push(date.weekday());
            }
        }
        if !days.contains(&self.end.weekday()) {
            days.push(self.end.weekday());
        }
        days
    }
}

impl fmt::Display for DateTimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.start.format(DATE_TIME_FORMAT),
            self.end.format(DATE_TIME_FORMAT)
        )
    }
}
