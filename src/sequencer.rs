//! Candidate window sequencing
//!
//! Produces the unbounded forward sequence of contiguous windows starting at
//! the schedule anchor. The caller decides when to stop.
//!
//! Window `k` spans `anchor + k·period` to `anchor + (k+1)·period`. Both ends
//! are measured from the anchor, so month sequences neither drift nor leave
//! gaps: after a clamped month end the window is shorter or longer than one
//! calendar period instead.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::period::Period;
use crate::range::DateTimeRange;

/// A candidate or accepted checkpoint window; each one ends where the next begins
pub type Window = DateTimeRange;

/// Stateful cursor over the windows of a schedule
#[derive(Debug, Clone)]
pub struct WindowSequencer {
    anchor: DateTime<Tz>,
    period: Period,
    step: u32,
    current: Option<Window>,
}

impl WindowSequencer {
    pub fn new(anchor: DateTime<Tz>, period: Period) -> Self {
        let current = Self::window_at(&anchor, &period, 0);
        Self {
            anchor,
            period,
            step: 0,
            current,
        }
    }

    fn window_at(anchor: &DateTime<Tz>, period: &Period, step: u32) -> Option<Window> {
        let start = period.add_times(anchor, step)?;
        let end = period.add_times(anchor, step.checked_add(1)?)?;
        Some(Window::new(start, end))
    }

    pub fn anchor(&self) -> DateTime<Tz> {
        self.anchor
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// The window under the cursor, `None` once calendar arithmetic overflows
    pub fn current(&self) -> Option<Window> {
        self.current
    }

    /// Move the cursor one period forward
    pub fn advance(&mut self) {
        match self.step.checked_add(1) {
            Some(step) => {
                self.step = step;
                self.current = Self::window_at(&self.anchor, &self.period, step);
            }
            None => self.current = None,
        }
    }
}

impl Iterator for WindowSequencer {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let window = self.current()?;
        self.advance();
        Some(window)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::period::PeriodUnit;
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;
    use proptest::prelude::*;

    proptest! {
        /// Starts strictly increase and windows tile the timeline without gaps
        #[test]
        fn windows_are_ordered_and_contiguous(
            amount in 1i64..40,
            unit_idx in 0usize..4,
            day in 1u32..29,
            hour in 0u32..24,
        ) {
            let unit = [PeriodUnit::Hours, PeriodUnit::Days, PeriodUnit::Months, PeriodUnit::Years][unit_idx];
            let period = Period::new(amount, unit).unwrap();
            let anchor = Shanghai.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap();
            let windows: Vec<Window> = WindowSequencer::new(anchor, period).take(20).collect();

            prop_assert_eq!(windows.len(), 20);
            for w in &windows {
                prop_assert!(w.start() < w.end());
            }
            for pair in windows.windows(2) {
                prop_assert!(pair[0].start() < pair[1].start());
                prop_assert_eq!(pair[0].end(), pair[1].start());
            }
            // Days 1..=28 never clamp, so each window is exactly one period
            for w in &windows {
                prop_assert_eq!(Some(w.end()), period.add_to(&w.start()));
            }
        }
    }
}
