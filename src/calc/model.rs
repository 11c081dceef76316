/// Candidate Lifecycle - Stateright Model
/// Verifies the single forward pass: Generated → Pruned | Filtering → Rejected | Accepted
/// Which steps may reject, whitelist or prune is observed by running the real
/// pipeline steps and calculator, not written down by hand
///
/// Run with: cargo test --release candidate_model -- --nocapture

use chrono::{DateTime, TimeDelta, Weekday};
use chrono_tz::Asia::Shanghai;
use chrono_tz::Tz;
use stateright::*;

use super::filter::{FilterConfig, FilterContext, Rejection, Verdict, PIPELINE};
use super::{CheckpointCalculator, Outcome, ScheduleDefinition};
use crate::period::{Period, PeriodUnit};
use crate::range::{parse_date_time, DateTimeRange, TimeOfDayRange};
use crate::sequencer::Window;

/// Number of pipeline steps, taken from the real pipeline
const STEPS: u8 = PIPELINE.len() as u8;

/// Step at which a whitelist range can accept a window
const WHITELIST_STEP: u8 = 4;

/// Lag bound step, skipped for historical runs
const LAG_STEP: u8 = 2;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Stage {
    Generated,
    Filtering { step: u8 },
    Pruned,
    Rejected { step: u8 },
    Accepted { whitelisted: bool },
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum CandidateAction {
    Prune,
    EnterFilter,
    PassStep,
    FailStep,
    Whitelist,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CandidateModel {
    pub stage: Stage,
    pub include_historical: bool,
    /// Highest step evaluated so far
    pub last_step: u8,
}

/// Verdicts one pipeline step was seen to reach
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepBehaviour {
    pub rejects: bool,
    pub whitelists: bool,
}

/// Transitions observed from the real pipeline, indexed by `include_historical`
#[derive(Clone, Debug)]
pub struct CandidateChecker {
    pub steps: [[StepBehaviour; PIPELINE.len()]; 2],
    pub prunes: [bool; 2],
}

fn at(s: &str) -> DateTime<Tz> {
    parse_date_time(s, Shanghai).unwrap()
}

impl CandidateChecker {
    /// Run every pipeline step on its own over a grid of windows, and a real
    /// calculator over an elapsed backlog, once per mode
    pub fn from_pipeline() -> Self {
        let now = at("2025-01-06 12:00:00");
        let around_now = DateTimeRange::new(now - TimeDelta::days(90), now + TimeDelta::days(90));
        let periods = [
            Period::new(1, PeriodUnit::Hours).unwrap(),
            Period::new(1, PeriodUnit::Days).unwrap(),
            Period::new(1, PeriodUnit::Months).unwrap(),
        ];

        let mut checker = Self {
            steps: [[StepBehaviour::default(); PIPELINE.len()]; 2],
            prunes: [false; 2],
        };

        for include_historical in [false, true] {
            let mode = usize::from(include_historical);
            let config = FilterConfig {
                include_historical,
                drop_weekdays: vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                    Weekday::Sat,
                    Weekday::Sun,
                ],
                drop_ranges: vec![around_now],
                business_hour_limits: vec![TimeOfDayRange::parse("09:00", "18:00").unwrap()],
                whitelist_ranges: vec![around_now],
                ..FilterConfig::default()
            };

            for period in periods {
                let ctx = FilterContext { now, period };
                for offset in [-120, 0, 120, 480] {
                    let start = now + TimeDelta::minutes(offset);
                    let window = Window::new(start, period.add_to(&start).unwrap());
                    for (index, step) in PIPELINE.iter().enumerate() {
                        let seen = &mut checker.steps[mode][index];
                        match step(&window, &config, &ctx) {
                            Some(Verdict::Rejected(_)) => seen.rejects = true,
                            Some(Verdict::Whitelisted(_)) => seen.whitelists = true,
                            Some(Verdict::Accepted) | None => {}
                        }
                    }
                }
            }

            let backlog = CheckpointCalculator::new(
                ScheduleDefinition::new(now - TimeDelta::days(10), 1, PeriodUnit::Days),
                now,
            )
            .include_historical(include_historical);
            checker.prunes[mode] = backlog
                .execute_traced()
                .iter()
                .any(|e| e.outcome == Outcome::Pruned);
        }

        checker
    }

    fn behaviour(&self, state: &CandidateModel, step: u8) -> StepBehaviour {
        self.steps[usize::from(state.include_historical)][usize::from(step - 1)]
    }
}

impl Model for CandidateChecker {
    type State = CandidateModel;
    type Action = CandidateAction;

    fn init_states(&self) -> Vec<Self::State> {
        [false, true]
            .into_iter()
            .map(|include_historical| CandidateModel {
                stage: Stage::Generated,
                include_historical,
                last_step: 0,
            })
            .collect()
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        match state.stage {
            Stage::Generated => {
                if self.prunes[usize::from(state.include_historical)] {
                    actions.push(CandidateAction::Prune);
                }
                actions.push(CandidateAction::EnterFilter);
            }

            Stage::Filtering { step } => {
                let behaviour = self.behaviour(state, step);
                actions.push(CandidateAction::PassStep);
                if behaviour.whitelists {
                    actions.push(CandidateAction::Whitelist);
                }
                if behaviour.rejects {
                    actions.push(CandidateAction::FailStep);
                }
            }

            Stage::Pruned | Stage::Rejected { .. } | Stage::Accepted { .. } => {
                // Terminal states - no actions
            }
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();

        match (&state.stage, action) {
            (Stage::Generated, CandidateAction::Prune) => {
                next.stage = Stage::Pruned;
            }
            (Stage::Generated, CandidateAction::EnterFilter) => {
                next.stage = Stage::Filtering { step: 1 };
                next.last_step = 1;
            }
            (Stage::Filtering { step }, CandidateAction::PassStep) => {
                if *step < STEPS {
                    next.stage = Stage::Filtering { step: step + 1 };
                    next.last_step = step + 1;
                } else {
                    next.stage = Stage::Accepted { whitelisted: false };
                }
            }
            (Stage::Filtering { step }, CandidateAction::FailStep) => {
                next.stage = Stage::Rejected { step: *step };
            }
            (Stage::Filtering { .. }, CandidateAction::Whitelist) => {
                next.stage = Stage::Accepted { whitelisted: true };
            }
            _ => return None,
        }

        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            // Safety: the whitelist accepts only after steps 1 to 3 passed
            Property::always("whitelist_after_freshness_and_hours", |_, state: &CandidateModel| {
                state.stage != Stage::Accepted { whitelisted: true } || state.last_step == WHITELIST_STEP
            }),
            // Safety: the whitelist step never rejects
            Property::always("whitelist_never_rejects", |_, state: &CandidateModel| {
                state.stage != Stage::Rejected { step: WHITELIST_STEP }
            }),
            // Safety: historical runs never prune and never apply the lag bound
            Property::always("historical_runs_keep_elapsed", |_, state: &CandidateModel| {
                !state.include_historical
                    || (state.stage != Stage::Pruned && state.stage != Stage::Rejected { step: LAG_STEP })
            }),
            // Safety: plain acceptance requires every step to have run
            Property::always("accepted_after_all_steps", |_, state: &CandidateModel| {
                state.stage != Stage::Accepted { whitelisted: false } || state.last_step == STEPS
            }),
            // Liveness: every candidate reaches a terminal state
            Property::eventually("candidate_terminates", |_, state: &CandidateModel| {
                matches!(
                    state.stage,
                    Stage::Pruned | Stage::Rejected { .. } | Stage::Accepted { .. }
                )
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::filter::Edge;
    use stateright::Checker;

    /// Walk the model to the state the real pipeline reports for `rejection`
    fn walk_to_rejection(include_historical: bool, rejection: &Rejection) -> CandidateModel {
        let model = CandidateChecker::from_pipeline();
        let mut state = model
            .init_states()
            .into_iter()
            .find(|s| s.include_historical == include_historical)
            .unwrap();
        state = model.next_state(&state, CandidateAction::EnterFilter).unwrap();
        while state.last_step < rejection.step() {
            state = model.next_state(&state, CandidateAction::PassStep).unwrap();
        }
        let mut actions = Vec::new();
        model.actions(&state, &mut actions);
        assert!(
            actions.contains(&CandidateAction::FailStep),
            "model forbids rejection at step {}",
            rejection.step()
        );
        model.next_state(&state, CandidateAction::FailStep).unwrap()
    }

    #[test]
    fn candidate_model_check_safety() {
        let checker = CandidateChecker::from_pipeline().checker().spawn_bfs().join();
        println!("States explored: {}", checker.unique_state_count());
        checker.assert_properties();
    }

    #[test]
    fn candidate_model_explores_both_modes() {
        let checker = CandidateChecker::from_pipeline().checker().spawn_bfs().join();
        assert!(
            checker.unique_state_count() > 20,
            "Expected more than 20 states, got {}",
            checker.unique_state_count()
        );
    }

    #[test]
    fn candidate_model_pruned_path() {
        let model = CandidateChecker::from_pipeline();
        let state = model.init_states()[0].clone();
        assert!(!state.include_historical);
        let state = model.next_state(&state, CandidateAction::Prune).unwrap();
        assert_eq!(state.stage, Stage::Pruned);
        assert_eq!(model.next_state(&state, CandidateAction::EnterFilter), None);
    }

    #[test]
    fn candidate_model_whitelist_path() {
        let model = CandidateChecker::from_pipeline();
        let mut state = model.init_states()[0].clone();
        state = model.next_state(&state, CandidateAction::EnterFilter).unwrap();
        for _ in 1..WHITELIST_STEP {
            state = model.next_state(&state, CandidateAction::PassStep).unwrap();
        }
        assert_eq!(state.stage, Stage::Filtering { step: WHITELIST_STEP });
        state = model.next_state(&state, CandidateAction::Whitelist).unwrap();
        assert_eq!(state.stage, Stage::Accepted { whitelisted: true });
    }

    #[test]
    fn candidate_model_matches_real_rejection_steps() {
        let limit = TimeOfDayRange::parse("09:00", "18:00").unwrap();
        let rejections = [
            Rejection::TooFarAhead { minutes: 90, max_lead: 30 },
            Rejection::TooFarBehind { minutes: 90, max_lag: 30 },
            Rejection::OutsideBusinessHours { limit, edge: Edge::Start },
            Rejection::WeekdayDropped { weekday: Weekday::Sun },
        ];
        for rejection in &rejections {
            let state = walk_to_rejection(false, rejection);
            assert_eq!(state.stage, Stage::Rejected { step: rejection.step() });
        }
        // Historical runs never reach the lag rejection
        let lead = walk_to_rejection(true, &rejections[0]);
        assert_eq!(lead.stage, Stage::Rejected { step: 1 });
    }

    #[test]
    fn candidate_model_steps_follow_pipeline() {
        let model = CandidateChecker::from_pipeline();
        let [fresh, historical] = model.steps;
        for (index, behaviour) in fresh.iter().enumerate() {
            let step = index as u8 + 1;
            assert_eq!(behaviour.whitelists, step == WHITELIST_STEP, "step {}", step);
            assert_eq!(behaviour.rejects, step != WHITELIST_STEP, "step {}", step);
        }
        assert!(!historical[usize::from(LAG_STEP - 1)].rejects);
        assert!(historical[0].rejects);
        assert_eq!(model.prunes, [true, false]);
    }

    #[test]
    fn candidate_model_reports_rejecting_whitelist() {
        let mut model = CandidateChecker::from_pipeline();
        model.steps[0][usize::from(WHITELIST_STEP - 1)].rejects = true;
        let checker = model.checker().spawn_bfs().join();
        assert!(checker.discovery("whitelist_never_rejects").is_some());
        assert!(checker.discovery("historical_runs_keep_elapsed").is_none());
    }

    #[test]
    fn candidate_model_reports_pruned_backlog_for_historical_runs() {
        let mut model = CandidateChecker::from_pipeline();
        model.prunes[1] = true;
        let checker = model.checker().spawn_bfs().join();
        assert!(checker.discovery("historical_runs_keep_elapsed").is_some());
        assert!(checker.discovery("whitelist_never_rejects").is_none());
    }
}
