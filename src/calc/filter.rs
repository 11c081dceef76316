//! Ordered filter pipeline for candidate windows
//!
//! Every step is a pure function of the window, the filter configuration and
//! the evaluation context. Steps run in the fixed order of [`PIPELINE`] and
//! the first step that reaches a verdict ends the evaluation:
//!
//! 1. lead bound (start too far after now)
//! 2. lag bound (start too far before now, skipped for historical runs)
//! 3. business-hour limits (start and end clock times inside every limit)
//! 4. whitelist (fully contained in a whitelist range: accept)
//! 5. long-cycle holiday rule (fully contained in a drop range: reject)
//! 6. short-cycle holiday rule (dropped weekday, or start in a drop range)
//!
//! A window that passes every step is accepted.

use chrono::{DateTime, Datelike, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

use crate::period::Period;
use crate::range::{DateTimeRange, TimeOfDayRange};
use crate::sequencer::Window;

pub const DEFAULT_MAX_LEAD_MINUTES: i64 = 30;
pub const DEFAULT_MAX_LAG_MINUTES: i64 = 30;

/// Value that disables a lead or lag bound
pub const BOUND_DISABLED: i64 = -1;

/// Filter settings applied to every candidate window
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Keep windows that already elapsed (also disables the lag bound)
    pub include_historical: bool,
    /// Short cycles only: drop windows starting on these weekdays
    pub drop_weekdays: Vec<Weekday>,
    /// Holiday-style exclusion ranges
    pub drop_ranges: Vec<DateTimeRange>,
    /// Working-hour limits; a window must start and end inside each one
    pub business_hour_limits: Vec<TimeOfDayRange>,
    /// Ranges that force acceptance of windows they fully contain
    pub whitelist_ranges: Vec<DateTimeRange>,
    /// Maximum minutes a start may lie after now, `None` when disabled
    pub max_lead_minutes: Option<i64>,
    /// Maximum minutes a start may lie before now, `None` when disabled
    pub max_lag_minutes: Option<i64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include_historical: false,
            drop_weekdays: Vec::new(),
            drop_ranges: Vec::new(),
            business_hour_limits: Vec::new(),
            whitelist_ranges: Vec::new(),
            max_lead_minutes: Some(DEFAULT_MAX_LEAD_MINUTES),
            max_lag_minutes: Some(DEFAULT_MAX_LAG_MINUTES),
        }
    }
}

impl FilterConfig {
    /// Convert a minute bound where any negative value (conventionally -1)
    /// disables the check
    pub fn bound(minutes: i64) -> Option<i64> {
        (minutes >= 0).then_some(minutes)
    }

    pub fn add_drop_weekday(&mut self, weekday: Weekday) {
        if !self.drop_weekdays.contains(&weekday) {
            self.drop_weekdays.push(weekday);
        }
    }
}

/// Everything a step needs besides the window and the configuration
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub now: DateTime<Tz>,
    pub period: Period,
}

/// Which end of a window failed a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Start,
    End,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Start => f.write_str("start"),
            Edge::End => f.write_str("end"),
        }
    }
}

/// Why a window was rejected, with the evidence of the failing step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    TooFarAhead { minutes: i64, max_lead: i64 },
    TooFarBehind { minutes: i64, max_lag: i64 },
    OutsideBusinessHours { limit: TimeOfDayRange, edge: Edge },
    WeekdayDropped { weekday: Weekday },
    StartsInDropRange { range: DateTimeRange },
    InsideDropRange { range: DateTimeRange },
}

impl Rejection {
    /// Pipeline step (1-based) that produced this rejection
    pub fn step(&self) -> u8 {
        match self {
            Rejection::TooFarAhead { .. } => 1,
            Rejection::TooFarBehind { .. } => 2,
            Rejection::OutsideBusinessHours { .. } => 3,
            Rejection::InsideDropRange { .. } => 5,
            Rejection::WeekdayDropped { .. } | Rejection::StartsInDropRange { .. } => 6,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooFarAhead { minutes, max_lead } => write!(
                f,
                "starts {} minutes after now (max lead {})",
                minutes, max_lead
            ),
            Rejection::TooFarBehind { minutes, max_lag } => write!(
                f,
                "starts {} minutes before now (max lag {})",
                minutes, max_lag
            ),
            Rejection::OutsideBusinessHours { limit, edge } => {
                write!(f, "{} time outside limit {}", edge, limit)
            }
            Rejection::WeekdayDropped { weekday } => write!(f, "starts on dropped weekday {}", weekday),
            Rejection::StartsInDropRange { range } => write!(f, "starts inside drop range {}", range),
            Rejection::InsideDropRange { range } => write!(f, "lies entirely inside drop range {}", range),
        }
    }
}

/// Final decision for a window that reached the filter pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Whitelisted(DateTimeRange),
    Rejected(Rejection),
}

/// A pipeline step: `None` passes the window on to the next step
pub type Step = fn(&Window, &FilterConfig, &FilterContext) -> Option<Verdict>;

/// The pipeline, in evaluation order
pub const PIPELINE: [Step; 6] = [
    lead_bound,
    lag_bound,
    business_hours,
    whitelist,
    long_cycle_holiday,
    short_cycle_holiday,
];

/// Run `window` through every step in order
pub fn evaluate(window: &Window, config: &FilterConfig, ctx: &FilterContext) -> Verdict {
    PIPELINE
        .iter()
        .find_map(|step| step(window, config, ctx))
        .unwrap_or(Verdict::Accepted)
}

/// Whole minutes from `from` to `to`, truncated toward zero
pub fn minutes_between(from: &DateTime<Tz>, to: &DateTime<Tz>) -> i64 {
    (*to - *from).num_minutes()
}

/// True when an enabled bound is exceeded
pub fn exceeds_bound(minutes: i64, bound: Option<i64>) -> bool {
    bound.is_some_and(|max| minutes > max)
}

pub fn lead_bound(window: &Window, config: &FilterConfig, ctx: &FilterContext) -> Option<Verdict> {
    let minutes = minutes_between(&ctx.now, &window.start());
    let max_lead = config.max_lead_minutes?;
    exceeds_bound(minutes, Some(max_lead))
        .then_some(Verdict::Rejected(Rejection::TooFarAhead { minutes, max_lead }))
}

pub fn lag_bound(window: &Window, config: &FilterConfig, ctx: &FilterContext) -> Option<Verdict> {
    if config.include_historical {
        return None;
    }
    let minutes = minutes_between(&window.start(), &ctx.now);
    let max_lag = config.max_lag_minutes?;
    exceeds_bound(minutes, Some(max_lag))
        .then_some(Verdict::Rejected(Rejection::TooFarBehind { minutes, max_lag }))
}

pub fn business_hours(window: &Window, config: &FilterConfig, _ctx: &FilterContext) -> Option<Verdict> {
    config.business_hour_limits.iter().find_map(|limit| {
        let edge = if !window.start_time_within(limit) {
            Edge::Start
        } else if !window.end_time_within(limit) {
            Edge::End
        } else {
            return None;
        };
        Some(Verdict::Rejected(Rejection::OutsideBusinessHours {
            limit: *limit,
            edge,
        }))
    })
}

pub fn whitelist(window: &Window, config: &FilterConfig, _ctx: &FilterContext) -> Option<Verdict> {
    config
        .whitelist_ranges
        .iter()
        .find(|range| range.contains_fully(window))
        .map(|range| Verdict::Whitelisted(*range))
}

pub fn long_cycle_holiday(window: &Window, config: &FilterConfig, ctx: &FilterContext) -> Option<Verdict> {
    if !ctx.period.is_long_cycle() {
        return None;
    }
    config
        .drop_ranges
        .iter()
        .find(|range| range.contains_fully(window))
        .map(|range| Verdict::Rejected(Rejection::InsideDropRange { range: *range }))
}

pub fn short_cycle_holiday(window: &Window, config: &FilterConfig, ctx: &FilterContext) -> Option<Verdict> {
    if ctx.period.is_long_cycle() {
        return None;
    }
    let weekday = window.start().weekday();
    if config.drop_weekdays.contains(&weekday) {
        return Some(Verdict::Rejected(Rejection::WeekdayDropped { weekday }));
    }
    // Only the start matters at this granularity
    config
        .drop_ranges
        .iter()
        .find(|range| range.contains_start(window))
        .map(|range| Verdict::Rejected(Rejection::StartsInDropRange { range: *range }))
}


/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn disabled_bound_never_rejects() {
        let minutes: i64 = kani::any();
        kani::assert(!exceeds_bound(minutes, None), "disabled bound must never reject");
    }

    #[kani::proof]
    fn negative_bounds_disable() {
        let minutes: i64 = kani::any();
        kani::assume(minutes < 0);
        kani::assert(FilterConfig::bound(minutes).is_none(), "negative bound must disable");
    }

    #[kani::proof]
    fn bound_is_strict() {
        let max: i64 = kani::any();
        kani::assume(max >= 0);
        kani::assert(!exceeds_bound(max, Some(max)), "reaching the bound is allowed");
    }
}
