//! Checkpoint calculator library - recurring inspection windows
//!
//! Given a schedule (anchor plus period) and an instant, decides which
//! checkpoint windows should be materialized now. This module exports the
//! calculation core and the driver components for integration testing.

pub mod calc;
pub mod cli;
pub mod config;
pub mod period;
pub mod range;
pub mod scheduler;
pub mod sequencer;

pub use calc::filter::{FilterConfig, Rejection};
pub use calc::{CheckpointCalculator, Evaluation, Outcome, ScheduleDefinition};
pub use period::{Period, PeriodError, PeriodUnit};
pub use range::{DateTimeRange, RangeError, TimeOfDayRange};
pub use sequencer::{Window, WindowSequencer};
