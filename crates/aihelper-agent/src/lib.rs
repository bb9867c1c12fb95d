//! AI Helper agent: the reason → act → observe engine.
//!
//! This crate contains:
//! - **tools**: Tool trait, registry, argument validation, and built-in tools
//! - **planner**: the Planner trait with backend-driven and rule-based planners
//! - **context**: prompt construction from a goal and its trajectory
//! - **executor**: bounded, retrying tool invocation
//! - **stop**: the stop controller
//! - **agent_loop**: the per-goal state machine
//! - **agent**: the caller-facing facade

pub mod agent;
pub mod agent_loop;
pub mod context;
pub mod executor;
pub mod planner;
pub mod stop;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use agent::{Agent, AgentError, GoalHandle};
pub use agent_loop::AgentLoop;
pub use context::ContextBuilder;
pub use executor::{Execution, Executor, Idempotency};
pub use planner::{LlmPlanner, Plan, Planner, PlannerError, RuleBasedPlanner};
pub use stop::{StopController, StopDecision};
pub use tools::{register_builtin_tools, Tool, ToolRegistry};
