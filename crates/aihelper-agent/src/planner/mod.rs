//! Planner: decides the next action from the goal and what happened so far.
//!
//! Planner output is untrusted. A reply that cannot be read at all is a
//! retryable [`PlannerError`]; a readable reply that names no usable action
//! becomes [`Action::Malformed`] and is recorded like any other step.

mod llm;
mod rules;

use async_trait::async_trait;
use thiserror::Error;

use aihelper_core::{Action, Goal, ToolSpec, Trajectory};
use aihelper_providers::BackendError;

pub use llm::{parse_action, LlmPlanner};
pub use rules::RuleBasedPlanner;

/// Tool name the planner uses to signal a final answer.
pub const FINISH_TOOL: &str = "finish";

/// One planning decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Free-form rationale; kept for audit only.
    pub thought: String,
    pub action: Action,
}

impl Plan {
    pub fn new(thought: impl Into<String>, action: Action) -> Self {
        Self {
            thought: thought.into(),
            action,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlannerError {
    /// The reply held no readable action.
    #[error("unparseable planner output: {0}")]
    Unparseable(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PlannerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PlannerError::Unparseable(_) => true,
            PlannerError::Backend(e) => e.is_retryable(),
        }
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        tools: &[ToolSpec],
    ) -> Result<Plan, PlannerError>;

    /// Display name for logging.
    fn name(&self) -> &str;
}
