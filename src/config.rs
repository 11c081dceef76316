use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
#[cfg(test)]
use std::collections::HashMap;
use std::env;

use crate::calc::filter::{BOUND_DISABLED, DEFAULT_MAX_LAG_MINUTES, DEFAULT_MAX_LEAD_MINUTES};
use crate::calc::{CheckpointCalculator, ScheduleDefinition};
use crate::period::{Period, PeriodUnit};
use crate::range::{parse_date_time, DateTimeRange, TimeOfDayRange, DATE_TIME_FORMAT};

/// Zone used when CHECKPOINT_TZ is not set
pub const DEFAULT_TZ: Tz = chrono_tz::Asia::Shanghai;

/// Separator between ranges in the *_RANGES variables
const RANGE_LIST_SEPARATOR: char = ';';

#[derive(Debug, Clone)]
pub struct Config {
    // Schedule
    pub calc_id: Option<String>,
    pub tz: Tz,
    pub anchor: DateTime<Tz>,
    pub period_amount: i64,
    pub period_unit: PeriodUnit,

    /// Fixed evaluation instant; the system clock when unset
    pub now: Option<DateTime<Tz>>,

    // Filters
    pub include_historical: bool,
    pub drop_weekdays: Vec<Weekday>,
    pub drop_ranges: Vec<DateTimeRange>,
    pub limit_ranges: Vec<TimeOfDayRange>,
    pub whitelist_ranges: Vec<DateTimeRange>,

    // Freshness bounds in minutes, -1 disables
    pub max_lead_minutes: i64,
    pub max_lag_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let tz = match get("CHECKPOINT_TZ") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| anyhow!("CHECKPOINT_TZ '{}' is not a known IANA timezone", name))?,
            None => DEFAULT_TZ,
        };

        let anchor = get("CHECKPOINT_ANCHOR").context("CHECKPOINT_ANCHOR not set")?;
        let anchor = parse_date_time(&anchor, tz).context("CHECKPOINT_ANCHOR must be yyyy-MM-dd HH:mm:ss")?;

        let now = get("CHECKPOINT_NOW")
            .map(|s| parse_date_time(&s, tz))
            .transpose()
            .context("CHECKPOINT_NOW must be yyyy-MM-dd HH:mm:ss")?;

        Ok(Config {
            calc_id: get("CHECKPOINT_ID").map(|s| s.trim().to_string()),
            tz,
            anchor,
            period_amount: get("CHECKPOINT_PERIOD_AMOUNT")
                .context("CHECKPOINT_PERIOD_AMOUNT not set")?
                .trim()
                .parse()
                .context("CHECKPOINT_PERIOD_AMOUNT must be an integer")?,
            period_unit: get("CHECKPOINT_PERIOD_UNIT")
                .context("CHECKPOINT_PERIOD_UNIT not set")?
                .parse()
                .context("CHECKPOINT_PERIOD_UNIT must be hours, days, months or years")?,
            now,

            include_historical: get("CHECKPOINT_INCLUDE_HISTORICAL")
                .map(|s| parse_bool(&s))
                .transpose()
                .context("CHECKPOINT_INCLUDE_HISTORICAL must be true or false")?
                .unwrap_or(false),
            drop_weekdays: get("CHECKPOINT_DROP_WEEKDAYS")
                .map(|s| parse_weekdays(&s))
                .transpose()
                .context("CHECKPOINT_DROP_WEEKDAYS must be a comma-separated list of weekdays")?
                .unwrap_or_default(),
            drop_ranges: get("CHECKPOINT_DROP_RANGES")
                .map(|s| parse_date_time_ranges(&s, tz))
                .transpose()
                .context("CHECKPOINT_DROP_RANGES is malformed")?
                .unwrap_or_default(),
            limit_ranges: get("CHECKPOINT_LIMIT_RANGES")
                .map(|s| parse_time_ranges(&s))
                .transpose()
                .context("CHECKPOINT_LIMIT_RANGES is malformed")?
                .unwrap_or_default(),
            whitelist_ranges: get("CHECKPOINT_WHITELIST_RANGES")
                .map(|s| parse_date_time_ranges(&s, tz))
                .transpose()
                .context("CHECKPOINT_WHITELIST_RANGES is malformed")?
                .unwrap_or_default(),

            max_lead_minutes: get("CHECKPOINT_MAX_LEAD_MINUTES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_LEAD_MINUTES),
            max_lag_minutes: get("CHECKPOINT_MAX_LAG_MINUTES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_LAG_MINUTES),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// The configured instant, or the system clock in the configured zone
    pub fn effective_now(&self) -> DateTime<Tz> {
        self.now.unwrap_or_else(|| Utc::now().with_timezone(&self.tz))
    }

    pub fn schedule(&self) -> ScheduleDefinition {
        ScheduleDefinition::new(self.anchor, self.period_amount, self.period_unit)
    }

    /// Build a calculator for `now` with every configured filter applied
    pub fn calculator(&self, now: DateTime<Tz>) -> CheckpointCalculator {
        let mut calc = CheckpointCalculator::new(self.schedule(), now)
            .include_historical(self.include_historical)
            .max_lead_minutes(self.max_lead_minutes)
            .max_lag_minutes(self.max_lag_minutes);

        if let Some(id) = &self.calc_id {
            calc = calc.with_calc_id(id);
        }
        for weekday in &self.drop_weekdays {
            calc = calc.drop_weekday(*weekday);
        }
        for range in &self.drop_ranges {
            calc = calc.drop_range(*range);
        }
        for range in &self.limit_ranges {
            calc = calc.limit_range(*range);
        }
        for range in &self.whitelist_ranges {
            calc = calc.whitelist_range(*range);
        }
        calc
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Period must be usable by the calendar arithmetic
        let period = match Period::new(self.period_amount, self.period_unit) {
            Ok(period) => Some(period),
            Err(e) => {
                errors.push(format!("CHECKPOINT_PERIOD_AMOUNT={} invalid: {}.", self.period_amount, e));
                None
            }
        };

        for (name, value) in [
            ("CHECKPOINT_MAX_LEAD_MINUTES", self.max_lead_minutes),
            ("CHECKPOINT_MAX_LAG_MINUTES", self.max_lag_minutes),
        ] {
            if let Some(problem) = bound_problem(name, value) {
                errors.push(problem);
            }
        }

        for range in self.drop_ranges.iter().filter(|r| r.is_inverted()) {
            errors.push(format!("CHECKPOINT_DROP_RANGES entry '{}' ends before it starts.", range));
        }
        for range in self.whitelist_ranges.iter().filter(|r| r.is_inverted()) {
            errors.push(format!("CHECKPOINT_WHITELIST_RANGES entry '{}' ends before it starts.", range));
        }
        for range in self.limit_ranges.iter().filter(|r| r.is_inverted()) {
            errors.push(format!("CHECKPOINT_LIMIT_RANGES entry '{}' ends before it starts.", range));
        }

        if let Some(period) = period {
            if period.is_long_cycle() && !self.drop_weekdays.is_empty() {
                errors.push(format!(
                    "CHECKPOINT_DROP_WEEKDAYS has no effect with a period of {} (long cycle).",
                    period
                ));
            }
        }

        let now = self.effective_now();
        if self.anchor > now {
            errors.push(format!(
                "CHECKPOINT_ANCHOR {} is after now ({}); no windows will be produced.",
                self.anchor.format(DATE_TIME_FORMAT),
                now.format(DATE_TIME_FORMAT)
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }
}

/// Reject lead/lag bounds below the -1 "disabled" marker
fn bound_problem(name: &str, value: i64) -> Option<String> {
    (value < BOUND_DISABLED).then(|| {
        format!(
            "{}={} invalid. Use -1 to disable or a non-negative number of minutes.",
            name, value
        )
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("'{}' is not a boolean", other),
    }
}

fn list_items(value: &str, separator: char) -> impl Iterator<Item = &str> {
    value.split(separator).map(str::trim).filter(|item| !item.is_empty())
}

/// Accepts chrono's weekday names: `mon`, `Monday`, `SAT`, ...
fn parse_weekdays(value: &str) -> Result<Vec<Weekday>> {
    let mut weekdays = Vec::new();
    for item in list_items(value, ',') {
        let weekday: Weekday = item
            .parse()
            .map_err(|_| anyhow!("'{}' is not a weekday", item))?;
        if !weekdays.contains(&weekday) {
            weekdays.push(weekday);
        }
    }
    Ok(weekdays)
}

fn parse_date_time_ranges(value: &str, tz: Tz) -> Result<Vec<DateTimeRange>> {
    list_items(value, RANGE_LIST_SEPARATOR)
        .map(|item| DateTimeRange::parse_pair(item, tz).with_context(|| format!("bad range '{}'", item)))
        .collect()
}

fn parse_time_ranges(value: &str) -> Result<Vec<TimeOfDayRange>> {
    list_items(value, RANGE_LIST_SEPARATOR)
        .map(|item| TimeOfDayRange::parse_pair(item).with_context(|| format!("bad range '{}'", item)))
        .collect()
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;
    use crate::calc::filter::FilterConfig;

    /// Proves: every bound that passes validation reaches the filters as
    /// either "disabled" (-1) or the exact minute count
    #[kani::proof]
    fn validated_bounds_reach_filters_unchanged() {
        let value: i64 = kani::any();
        if bound_problem("CHECKPOINT_MAX_LEAD_MINUTES", value).is_none() {
            let bound = FilterConfig::bound(value);
            if value == BOUND_DISABLED {
                kani::assert(bound.is_none(), "-1 disables the check");
            } else {
                kani::assert(bound == Some(value), "non-negative bounds pass through");
            }
        } else {
            kani::assert(value < BOUND_DISABLED, "only values below -1 are rejected");
        }
    }
}
