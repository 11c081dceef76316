//! Checkpoint calculator
//!
//! Walks the schedule's windows from the anchor up to `now + period`, prunes
//! windows that already elapsed, and passes the rest through the ordered
//! filter pipeline. Misconfiguration yields an empty result and a log line,
//! never an error: the calculator runs unattended once a minute.

pub mod filter;

#[cfg(test)]
mod model;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::period::{Period, PeriodUnit};
use crate::range::{DateTimeRange, TimeOfDayRange, DATE_TIME_FORMAT};
use crate::sequencer::{Window, WindowSequencer};
use filter::{FilterConfig, FilterContext, Rejection, Verdict};

static CALC_ID_GENERATOR: AtomicU64 = AtomicU64::new(0);

/// A recurring checkpoint: first window start plus a period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDefinition {
    anchor: DateTime<Tz>,
    period_amount: i64,
    period_unit: PeriodUnit,
}

impl ScheduleDefinition {
    /// The amount is validated when the calculator runs, not here, so a bad
    /// definition produces an empty result instead of an error.
    pub fn new(anchor: DateTime<Tz>, period_amount: i64, period_unit: PeriodUnit) -> Self {
        Self {
            anchor,
            period_amount,
            period_unit,
        }
    }

    pub fn anchor(&self) -> DateTime<Tz> {
        self.anchor
    }

    pub fn period_amount(&self) -> i64 {
        self.period_amount
    }

    pub fn period_unit(&self) -> PeriodUnit {
        self.period_unit
    }

    /// Zone every timestamp of the calculation is expressed in
    pub fn tz(&self) -> Tz {
        self.anchor.timezone()
    }
}

/// What happened to a generated candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Already elapsed, dropped before filtering
    Pruned,
    Rejected(Rejection),
    /// Accepted by a whitelist range, skipping the holiday rules
    Whitelisted(DateTimeRange),
    Accepted,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted | Outcome::Whitelisted(_))
    }
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accepted => Outcome::Accepted,
            Verdict::Whitelisted(range) => Outcome::Whitelisted(range),
            Verdict::Rejected(rejection) => Outcome::Rejected(rejection),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pruned => f.write_str("pruned (elapsed)"),
            Outcome::Rejected(rejection) => write!(f, "rejected: {}", rejection),
            Outcome::Whitelisted(range) => write!(f, "accepted: whitelisted by {}", range),
            Outcome::Accepted => f.write_str("accepted"),
        }
    }
}

/// One candidate and its outcome, as reported by
/// [`CheckpointCalculator::execute_traced`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub window: Window,
    pub outcome: Outcome,
}

/// Computes the checkpoint windows due for one schedule at one instant.
///
/// Filters are configured with the builder methods before calling
/// [`execute`](Self::execute). An instance is bound to its `now`; build a new
/// one (or call [`with_now`](Self::with_now)) for the next tick.
#[derive(Debug, Clone)]
pub struct CheckpointCalculator {
    calc_id: String,
    schedule: ScheduleDefinition,
    now: DateTime<Tz>,
    filters: FilterConfig,
}

impl CheckpointCalculator {
    pub fn new(schedule: ScheduleDefinition, now: DateTime<Tz>) -> Self {
        let id = CALC_ID_GENERATOR.fetch_add(1, Ordering::Relaxed);
        Self {
            calc_id: format!("#CPC{}", id),
            now: now.with_timezone(&schedule.tz()),
            schedule,
            filters: FilterConfig::default(),
        }
    }

    /// Use the system clock, in the schedule's zone, as `now`
    pub fn starting_now(schedule: ScheduleDefinition) -> Self {
        let now = Utc::now().with_timezone(&schedule.tz());
        Self::new(schedule, now)
    }

    pub fn with_calc_id(mut self, id: impl fmt::Display) -> Self {
        self.calc_id = format!("#CPC{}", id);
        self
    }

    /// Rebind the calculator to another instant
    pub fn with_now(mut self, now: DateTime<Tz>) -> Self {
        self.now = now.with_timezone(&self.schedule.tz());
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn include_historical(mut self, include: bool) -> Self {
        self.filters.include_historical = include;
        self
    }

    pub fn drop_weekday(mut self, weekday: chrono::Weekday) -> Self {
        self.filters.add_drop_weekday(weekday);
        self
    }

    pub fn drop_range(mut self, range: DateTimeRange) -> Self {
        self.filters.drop_ranges.push(range);
        self
    }

    pub fn limit_range(mut self, range: TimeOfDayRange) -> Self {
        self.filters.business_hour_limits.push(range);
        self
    }

    pub fn whitelist_range(mut self, range: DateTimeRange) -> Self {
        self.filters.whitelist_ranges.push(range);
        self
    }

    /// Maximum minutes a window may start after now; -1 disables
    pub fn max_lead_minutes(mut self, minutes: i64) -> Self {
        self.filters.max_lead_minutes = FilterConfig::bound(minutes);
        self
    }

    /// Maximum minutes a window may start before now; -1 disables
    pub fn max_lag_minutes(mut self, minutes: i64) -> Self {
        self.filters.max_lag_minutes = FilterConfig::bound(minutes);
        self
    }

    pub fn calc_id(&self) -> &str {
        &self.calc_id
    }

    pub fn schedule(&self) -> &ScheduleDefinition {
        &self.schedule
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.now
    }

    pub fn filters(&self) -> &FilterConfig {
        &self.filters
    }

    /// `now + period`; no window starting at or after it is generated
    pub fn deadline(&self) -> Option<DateTime<Tz>> {
        let period = Period::new(self.schedule.period_amount, self.schedule.period_unit).ok()?;
        period.add_to(&self.now)
    }

    /// Accepted windows in chronological order
    pub fn execute(&self) -> Vec<Window> {
        let mut accepted = Vec::new();
        self.run(|evaluation| {
            if evaluation.outcome.is_accepted() {
                accepted.push(evaluation.window);
            }
        });

        if accepted.is_empty() {
            info!("[{}] No checkpoint windows created", self.calc_id);
        } else {
            for window in &accepted {
                info!("[{}] Final checkpoint window: {}", self.calc_id, window);
            }
        }
        accepted
    }

    /// Every generated candidate with its outcome, including pruned ones
    pub fn execute_traced(&self) -> Vec<Evaluation> {
        let mut evaluations = Vec::new();
        self.run(|evaluation| evaluations.push(evaluation));
        evaluations
    }

    fn run<F>(&self, mut sink: F)
    where
        F: FnMut(Evaluation),
    {
        let Some(period) = self.checked_period() else {
            return;
        };

        let anchor = self.schedule.anchor;
        if anchor > self.now {
            info!(
                "[{}] Calculation skipped: anchor {} is in the future (now {})",
                self.calc_id,
                anchor.format(DATE_TIME_FORMAT),
                self.now.format(DATE_TIME_FORMAT)
            );
            return;
        }

        let Some(deadline) = period.add_to(&self.now) else {
            warn!("[{}] Calculation skipped: deadline overflows for period {}", self.calc_id, period);
            return;
        };

        info!(
            "[{}] New checkpoint calculation: period {}, include historical: {}",
            self.calc_id, period, self.filters.include_historical
        );

        let ctx = FilterContext {
            now: self.now,
            period,
        };
        let mut sequencer = WindowSequencer::new(anchor, period);

        while let Some(window) = sequencer.current() {
            if window.start() >= deadline {
                break;
            }
            sequencer.advance();

            if !self.filters.include_historical && window.start() < self.now && window.end() < self.now {
                sink(Evaluation {
                    window,
                    outcome: Outcome::Pruned,
                });
                continue;
            }

            debug!("[{}] Candidate window: {}", self.calc_id, window);
            let outcome = Outcome::from(filter::evaluate(&window, &self.filters, &ctx));
            match &outcome {
                Outcome::Rejected(rejection) => {
                    debug!("[{}] Dropped window {}: {}", self.calc_id, window, rejection)
                }
                Outcome::Whitelisted(range) => {
                    debug!("[{}] Kept window {}: inside whitelist {}", self.calc_id, window, range)
                }
                Outcome::Accepted | Outcome::Pruned => {}
            }
            sink(Evaluation { window, outcome });
        }
    }

    fn checked_period(&self) -> Option<Period> {
        match Period::new(self.schedule.period_amount, self.schedule.period_unit) {
            Ok(period) => Some(period),
            Err(e) => {
                info!("[{}] Calculation skipped: {}", self.calc_id, e);
                None
            }
        }
    }
}
