//! Stop controller: decides after every recorded step whether the run ends.
//!
//! Rules are checked in a fixed order so that a final answer always wins over
//! the step limit, and the step limit over the error budget.

use std::time::Duration;

use tokio::time::Instant;

use aihelper_core::{AgentConfig, TerminationReason, Trajectory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    /// The last step is a final answer.
    Succeed(String),
    /// Step limit reached; carries the best partial answer, if any.
    Incomplete { partial: Option<String> },
    Abort(TerminationReason),
}

pub struct StopController {
    started: Instant,
    goal_timeout: Option<Duration>,
}

impl StopController {
    pub fn new(goal_timeout: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            goal_timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the goal's wall-clock budget is spent.
    pub fn timed_out(&self) -> bool {
        self.goal_timeout.is_some_and(|t| self.elapsed() > t)
    }

    pub fn should_stop(&self, trajectory: &Trajectory, config: &AgentConfig) -> StopDecision {
        if let Some(answer) = trajectory.final_answer() {
            return StopDecision::Succeed(answer.to_string());
        }
        if trajectory.len() >= config.max_steps {
            return StopDecision::Incomplete {
                partial: trajectory.best_partial_answer(),
            };
        }
        if trajectory.error_count(|k| config.counts_toward_budget(k)) > config.error_budget {
            return StopDecision::Abort(TerminationReason::ErrorBudgetExhausted);
        }
        if self.timed_out() {
            return StopDecision::Abort(TerminationReason::GoalTimeout);
        }
        StopDecision::Continue
    }
}
