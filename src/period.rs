//! Schedule periods and calendar-aware stepping
//!
//! Hours advance on the instant timeline. Days, months and years advance on the
//! local calendar of the timestamp's zone and are resolved back into the zone
//! afterwards, so "1 month" after Jan 31 is Feb 28 and "1 day" keeps the
//! wall-clock time across DST changes.

use chrono::{DateTime, Days, LocalResult, Months, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building a [`Period`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("unknown period unit '{0}' (expected hours, days, months or years)")]
    UnknownUnit(String),
    #[error("period amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("period amount {0} is too large")]
    AmountTooLarge(i64),
}

/// Unit of a schedule period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Hours,
    Days,
    Months,
    Years,
}

impl FromStr for PeriodUnit {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "hour" | "hours" => Ok(PeriodUnit::Hours),
            "d" | "day" | "days" => Ok(PeriodUnit::Days),
            "month" | "months" => Ok(PeriodUnit::Months),
            "y" | "year" | "years" => Ok(PeriodUnit::Years),
            _ => Err(PeriodError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodUnit::Hours => "hours",
            PeriodUnit::Days => "days",
            PeriodUnit::Months => "months",
            PeriodUnit::Years => "years",
        };
        f.write_str(name)
    }
}

/// A validated, positive schedule period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Period {
    amount: u32,
    unit: PeriodUnit,
}

impl Period {
    /// Build a period. The amount must be positive and fit in a `u32`.
    pub fn new(amount: i64, unit: PeriodUnit) -> Result<Self, PeriodError> {
        if amount <= 0 {
            return Err(PeriodError::NonPositiveAmount(amount));
        }
        let amount = u32::try_from(amount).map_err(|_| PeriodError::AmountTooLarge(amount))?;
        Ok(Self { amount, unit })
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> PeriodUnit {
        self.unit
    }

    /// Long cycles (a week or more, or any month/year period) use the
    /// whole-window holiday rule and ignore weekday drops.
    pub fn is_long_cycle(&self) -> bool {
        match self.unit {
            PeriodUnit::Months | PeriodUnit::Years => true,
            PeriodUnit::Days => self.amount >= 7,
            PeriodUnit::Hours => false,
        }
    }

    /// `t + self`, or `None` when the result is not representable
    pub fn add_to(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.add_times(t, 1)
    }

    /// `t + times * self`, computed in one step so month/year sequences do
    /// not drift toward the end of short months.
    pub fn add_times(&self, t: &DateTime<Tz>, times: u32) -> Option<DateTime<Tz>> {
        let steps = u64::from(self.amount).checked_mul(u64::from(times))?;
        match self.unit {
            PeriodUnit::Hours => {
                let hours = i64::try_from(steps).ok()?;
                t.checked_add_signed(TimeDelta::try_hours(hours)?)
            }
            PeriodUnit::Days => shift_local(t, |local| local.checked_add_days(Days::new(steps))),
            PeriodUnit::Months => {
                let months = u32::try_from(steps).ok()?;
                shift_local(t, |local| local.checked_add_months(Months::new(months)))
            }
            PeriodUnit::Years => {
                let months = u32::try_from(steps.checked_mul(12)?).ok()?;
                shift_local(t, |local| local.checked_add_months(Months::new(months)))
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

/// Apply a calendar shift to the local wall-clock time and map it back into
/// the zone. Ambiguous times keep the original offset when possible, times
/// inside a DST gap are pushed forward by the length of the gap.
fn shift_local<F>(t: &DateTime<Tz>, shift: F) -> Option<DateTime<Tz>>
where
    F: FnOnce(NaiveDateTime) -> Option<NaiveDateTime>,
{
    let tz = t.timezone();
    let local = shift(t.naive_local())?;

    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, latest) => {
            if latest.offset().fix() == t.offset().fix() {
                Some(latest)
            } else {
                Some(earliest)
            }
        }
        LocalResult::None => {
            // Interpret the missing wall-clock time with the pre-transition offset
            let probe = local.checked_sub_signed(TimeDelta::days(1))?;
            let offset = tz.offset_from_utc_datetime(&probe).fix();
            let utc = local.checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}
