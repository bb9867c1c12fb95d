//! Trajectory: the ordered, append-only, bounded history of one goal run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrajectoryError;
use crate::types::{Action, ErrorKind, Observation};

/// One completed reason/act/observe cycle. Never modified after it is pushed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// 1-based position in the trajectory (assigned on push).
    pub number: usize,
    pub thought: String,
    pub action: Action,
    /// The deciding observation. Absent only for a final answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    /// Superseded attempts, oldest first. Audit only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retries: Vec<Observation>,
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn new(thought: impl Into<String>, action: Action, observation: Option<Observation>) -> Self {
        Self {
            number: 0,
            thought: thought.into(),
            action,
            observation,
            retries: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_retries(mut self, retries: Vec<Observation>) -> Self {
        self.retries = retries;
        self
    }

    /// Error kind of the deciding observation, if it failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.observation.as_ref().and_then(|o| o.error_kind)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    steps: Vec<Step>,
    max_steps: usize,
}

impl Trajectory {
    pub fn new(max_steps: usize) -> Self {
        Self {
            steps: Vec::with_capacity(max_steps.min(64)),
            max_steps,
        }
    }

    /// Append a step, numbering it. Rejected once `max_steps` is reached.
    pub fn push(&mut self, mut step: Step) -> Result<&Step, TrajectoryError> {
        if self.is_full() {
            return Err(TrajectoryError::Full {
                max_steps: self.max_steps,
            });
        }
        step.number = self.steps.len() + 1;
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn is_full(&self) -> bool {
        self.steps.len() >= self.max_steps
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Count steps whose deciding observation failed with a kind accepted by `counted`.
    pub fn error_count(&self, counted: impl Fn(ErrorKind) -> bool) -> usize {
        self.steps
            .iter()
            .filter_map(Step::error_kind)
            .filter(|k| counted(*k))
            .count()
    }

    /// The answer of the last step, if it is a final answer.
    pub fn final_answer(&self) -> Option<&str> {
        match self.last().map(|s| &s.action) {
            Some(Action::FinalAnswer { answer }) => Some(answer),
            _ => None,
        }
    }

    /// Text of the most recent successful observation.
    pub fn best_partial_answer(&self) -> Option<String> {
        self.steps
            .iter()
            .rev()
            .filter_map(|s| s.observation.as_ref())
            .find(|o| o.is_success())
            .map(Observation::render)
    }
}
