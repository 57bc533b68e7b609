//! Stop condition: when a run of the loop ends.

use tracing::info;

use super::model::{ConfidenceAssessment, ConfidenceLevel};
use super::session::TerminalReason;
use crate::config::EngineConfig;

/// What the engine observed at the end of a cycle.
#[derive(Debug, Clone)]
pub struct CycleObservation<'a> {
    pub cycle: u32,
    pub planner_done: bool,
    pub assessment: &'a ConfidenceAssessment,
    pub new_findings: usize,
    pub stop_requested: bool,
}

/// Counters the policy carries from cycle to cycle. Reset when a follow-up
/// starts a new run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopState {
    /// Cycles completed in the current run.
    pub cycles_in_run: u32,
    /// Consecutive cycles at or under the yield threshold.
    pub low_yield_streak: u32,
}

impl StopState {
    pub fn new_run(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    Stop(TerminalReason),
}

/// Evaluates the stop condition after every cycle.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    max_cycles: u32,
    threshold: usize,
    window: u32,
}

impl StopPolicy {
    pub fn new(max_cycles: u32, threshold: usize, window: u32) -> Self {
        Self {
            max_cycles: max_cycles.max(1),
            threshold,
            window: window.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.max_cycles,
            config.diminishing_threshold,
            config.diminishing_window,
        )
    }

    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    pub fn evaluate(&self, state: &mut StopState, seen: &CycleObservation<'_>) -> StopDecision {
        state.cycles_in_run += 1;
        if seen.new_findings <= self.threshold {
            state.low_yield_streak += 1;
        } else {
            state.low_yield_streak = 0;
        }

        if seen.stop_requested {
            return StopDecision::Stop(TerminalReason::UserRequested);
        }

        // A "done" from the planner does not count while any category is
        // still below medium. The next cycle's plan sees the weak categories.
        if seen.planner_done {
            let weak = seen.assessment.below(ConfidenceLevel::Medium);
            if weak.is_empty() {
                return StopDecision::Stop(TerminalReason::PlannerSatisfied);
            }
            info!(
                cycle = seen.cycle,
                weak = ?weak,
                "Planner signalled done with weak categories, continuing"
            );
        }

        if state.low_yield_streak >= self.window {
            return StopDecision::Stop(TerminalReason::DiminishingReturns);
        }
        if state.cycles_in_run >= self.max_cycles {
            return StopDecision::Stop(TerminalReason::MaxCycles);
        }
        StopDecision::Continue
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::model::FindingCategory;

    fn observe(cycle: u32, new_findings: usize, assessment: &ConfidenceAssessment) -> CycleObservation<'_> {
        CycleObservation {
            cycle,
            planner_done: false,
            assessment,
            new_findings,
            stop_requested: false,
        }
    }

    fn all_medium() -> ConfidenceAssessment {
        FindingCategory::ALL
            .into_iter()
            .fold(ConfidenceAssessment::new(), |a, c| {
                a.with(c, ConfidenceLevel::Medium)
            })
    }

    #[test]
    fn test_planner_done_with_medium_floor() {
        let policy = StopPolicy::default();
        let mut state = StopState::default();
        let assessment = all_medium();
        let mut seen = observe(1, 10, &assessment);
        seen.planner_done = true;
        assert_eq!(
            policy.evaluate(&mut state, &seen),
            StopDecision::Stop(TerminalReason::PlannerSatisfied)
        );
    }

    #[test]
    fn test_planner_done_overridden_by_weak_category() {
        let policy = StopPolicy::default();
        let mut state = StopState::default();
        let assessment = all_medium().with(FindingCategory::Financial, ConfidenceLevel::Low);
        let mut seen = observe(1, 10, &assessment);
        seen.planner_done = true;
        assert_eq!(policy.evaluate(&mut state, &seen), StopDecision::Continue);
    }

    #[test]
    fn test_diminishing_returns_needs_consecutive_cycles() {
        let policy = StopPolicy::new(10, 2, 2);
        let mut state = StopState::default();
        let assessment = ConfidenceAssessment::new();
        assert_eq!(
            policy.evaluate(&mut state, &observe(1, 8, &assessment)),
            StopDecision::Continue
        );
        assert_eq!(
            policy.evaluate(&mut state, &observe(2, 2, &assessment)),
            StopDecision::Continue
        );
        assert_eq!(
            policy.evaluate(&mut state, &observe(3, 5, &assessment)),
            StopDecision::Continue
        );
        assert_eq!(
            policy.evaluate(&mut state, &observe(4, 1, &assessment)),
            StopDecision::Continue
        );
        assert_eq!(
            policy.evaluate(&mut state, &observe(5, 0, &assessment)),
            StopDecision::Stop(TerminalReason::DiminishingReturns)
        );
    }

    #[test]
    fn test_max_cycles_is_completion_not_failure() {
        let policy = StopPolicy::new(3, 0, 5);
        let mut state = StopState::default();
        let assessment = ConfidenceAssessment::new().with(FindingCategory::People, ConfidenceLevel::Low);
        for cycle in 1..3 {
            assert_eq!(
                policy.evaluate(&mut state, &observe(cycle, 4, &assessment)),
                StopDecision::Continue
            );
        }
        let decision = policy.evaluate(&mut state, &observe(3, 4, &assessment));
        assert_eq!(decision, StopDecision::Stop(TerminalReason::MaxCycles));
        assert_eq!(TerminalReason::MaxCycles.status().as_str(), "completed");
    }

    #[test]
    fn test_external_stop_wins() {
        let policy = StopPolicy::default();
        let mut state = StopState::default();
        let assessment = all_medium();
        let mut seen = observe(1, 0, &assessment);
        seen.stop_requested = true;
        seen.planner_done = true;
        assert_eq!(
            policy.evaluate(&mut state, &seen),
            StopDecision::Stop(TerminalReason::UserRequested)
        );
    }

    #[test]
    fn test_new_run_resets_counters() {
        let policy = StopPolicy::new(2, 2, 2);
        let mut state = StopState::default();
        let assessment = ConfidenceAssessment::new();
        policy.evaluate(&mut state, &observe(1, 9, &assessment));
        assert_eq!(
            policy.evaluate(&mut state, &observe(2, 9, &assessment)),
            StopDecision::Stop(TerminalReason::MaxCycles)
        );
        state.new_run();
        assert_eq!(
            policy.evaluate(&mut state, &observe(3, 9, &assessment)),
            StopDecision::Continue
        );
    }
}
