//! Agent loop: the PLANNING → ACTING → OBSERVING state machine that drives
//! one goal to a result.
//!
//! ```text
//! PLANNING ──final answer──────────────────────────▶ DONE
//!    │ invoke                        malformed
//!    ▼                                   │
//! ACTING ──▶ OBSERVING ◀─────────────────┘
//!               │ stop controller
//!               ├─ continue ──▶ PLANNING
//!               └─ succeed / step limit / abort ──▶ DONE | FAILED
//! ```
//!
//! Cancellation is honoured only at PLANNING entry and right after a step is
//! recorded, never in the middle of a tool execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aihelper_core::{
    Action, AgentConfig, AgentResult, ErrorKind, Goal, Memory, Observation, Step,
    TerminationReason, ToolCall, ToolSpec, Trajectory,
};

use crate::executor::{Executor, Idempotency};
use crate::planner::{Plan, Planner, PlannerError};
use crate::stop::{StopController, StopDecision};
use crate::tools::ToolRegistry;

enum State {
    Planning,
    Acting { thought: String, call: ToolCall },
    Observing(Step),
}

/// How a run ended, before it is packaged into an [`AgentResult`].
struct Ending {
    reason: TerminationReason,
    answer: Option<String>,
    detail: Option<String>,
}

impl Ending {
    fn new(reason: TerminationReason, answer: Option<String>) -> Self {
        Self {
            reason,
            answer,
            detail: None,
        }
    }

    fn aborted(reason: TerminationReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            answer: None,
            detail: Some(detail.into()),
        }
    }
}

/// One goal run. Build a fresh loop per goal; the registry and planner are
/// shared, the trajectory is not.
pub struct AgentLoop {
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    memory: Option<Arc<dyn Memory>>,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(registry: Arc<ToolRegistry>, planner: Arc<dyn Planner>, config: AgentConfig) -> Self {
        Self {
            registry,
            planner,
            memory: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Use `token` to cancel this run from outside.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `goal` to completion. Never fails: every outcome, including
    /// planner failure and cancellation, is an [`AgentResult`].
    pub async fn run(&self, goal: &Goal) -> AgentResult {
        info!(
            goal_id = %goal.id,
            planner = self.planner.name(),
            max_steps = self.config.max_steps,
            "starting goal"
        );

        let stop = StopController::new(self.config.goal_timeout);
        let executor = Executor::new(Arc::clone(&self.registry), &self.config);
        let marker = Idempotency::from(self.config.retry_idempotent_mutations);
        let tools = self.registry.list();
        let mut trajectory = Trajectory::new(self.config.max_steps);
        let mut state = State::Planning;

        let ending = loop {
            state = match state {
                State::Planning => {
                    if self.cancel.is_cancelled() {
                        break Ending::aborted(TerminationReason::Cancelled, "cancelled by caller");
                    }
                    if trajectory.is_full() {
                        break Ending::new(TerminationReason::StepLimit, trajectory.best_partial_answer());
                    }
                    if stop.timed_out() {
                        break Ending::aborted(TerminationReason::GoalTimeout, "goal time budget spent");
                    }

                    let plan = match self.plan_with_retries(goal, &trajectory, &tools).await {
                        Ok(plan) => plan,
                        Err(e) => break Ending::aborted(TerminationReason::PlannerFailure, e.to_string()),
                    };
                    debug!(thought = %plan.thought, "planned");

                    match plan.action {
                        Action::Invoke(call) => State::Acting {
                            thought: plan.thought,
                            call,
                        },
                        Action::FinalAnswer { answer } => {
                            let step = Step::new(plan.thought, Action::final_answer(answer.clone()), None);
                            if trajectory.push(step).is_err() {
                                break Ending::new(TerminationReason::StepLimit, trajectory.best_partial_answer());
                            }
                            break Ending::new(TerminationReason::FinalAnswer, Some(answer));
                        }
                        Action::Malformed { raw, reason } => {
                            warn!(reason = %reason, "planner produced an invalid action");
                            let observation = Observation::failure(
                                ErrorKind::InvalidAction,
                                format!("invalid action: {reason}"),
                                std::time::Duration::ZERO,
                            );
                            State::Observing(Step::new(
                                plan.thought,
                                Action::Malformed { raw, reason },
                                Some(observation),
                            ))
                        }
                    }
                }

                State::Acting { thought, call } => {
                    let execution = executor.execute(&call, self.config.step_timeout, marker).await;
                    State::Observing(
                        Step::new(thought, Action::Invoke(call), Some(execution.observation))
                            .with_retries(execution.retries),
                    )
                }

                State::Observing(step) => {
                    match trajectory.push(step) {
                        Ok(step) => debug!(
                            step = step.number,
                            tool = step.action.tool_name().unwrap_or("-"),
                            error = step.error_kind().map(ErrorKind::as_str),
                            retries = step.retries.len(),
                            "step recorded"
                        ),
                        Err(_) => {
                            break Ending::new(TerminationReason::StepLimit, trajectory.best_partial_answer())
                        }
                    }

                    if self.cancel.is_cancelled() {
                        break Ending::aborted(TerminationReason::Cancelled, "cancelled by caller");
                    }

                    match stop.should_stop(&trajectory, &self.config) {
                        StopDecision::Continue => State::Planning,
                        StopDecision::Succeed(answer) => {
                            break Ending::new(TerminationReason::FinalAnswer, Some(answer))
                        }
                        StopDecision::Incomplete { partial } => {
                            break Ending::new(TerminationReason::StepLimit, partial)
                        }
                        StopDecision::Abort(reason) => break self.abort_ending(reason, &trajectory),
                    }
                }
            };
        };

        let mut result = AgentResult::new(
            goal.id.clone(),
            ending.reason,
            ending.answer,
            trajectory,
            stop.elapsed(),
        );
        if let Some(detail) = ending.detail {
            result = result.with_detail(detail);
        }

        info!(
            goal_id = %goal.id,
            status = ?result.status,
            reason = %result.reason,
            steps = result.trajectory.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "goal finished"
        );

        self.remember(goal, &result).await;
        result
    }

    /// Ask the planner for the next action, retrying unreadable replies and
    /// transient backend errors with backoff.
    async fn plan_with_retries(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        tools: &[ToolSpec],
    ) -> Result<Plan, String> {
        let attempts = self.config.planner_attempts();
        let mut attempt = 1;
        loop {
            match self.planner.plan(goal, trajectory, tools).await {
                Ok(plan) => return Ok(plan),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        backoff_ms = delay.as_millis() as u64,
                        "planner failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(describe_planner_failure(&e, attempt)),
            }
        }
    }

    fn abort_ending(&self, reason: TerminationReason, trajectory: &Trajectory) -> Ending {
        let detail = match reason {
            TerminationReason::ErrorBudgetExhausted => format!(
                "{} failed steps exceed the error budget of {}",
                trajectory.error_count(|k| self.config.counts_toward_budget(k)),
                self.config.error_budget
            ),
            TerminationReason::GoalTimeout => "goal time budget spent".to_string(),
            other => other.to_string(),
        };
        Ending::aborted(reason, detail)
    }

    /// Hand the finished run to memory. Failures are logged, never surfaced.
    async fn remember(&self, goal: &Goal, result: &AgentResult) {
        let Some(memory) = &self.memory else {
            return;
        };
        if let Err(e) = memory.append_trajectory(goal, &result.trajectory, result).await {
            warn!(goal_id = %goal.id, error = %e, "failed to record goal in memory");
        }
    }
}

fn describe_planner_failure(err: &PlannerError, attempts: u32) -> String {
    if attempts > 1 {
        format!("planner failed after {attempts} attempts: {err}")
    } else {
        format!("planner failed: {err}")
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
