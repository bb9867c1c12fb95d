//! Caller-facing entry point.
//!
//! An [`Agent`] owns the long-lived, shared pieces (tool registry, planner,
//! memory) and builds a fresh [`AgentLoop`] per goal, so concurrent goals never
//! share a trajectory.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use aihelper_core::{AgentConfig, AgentResult, Goal, Memory};

use crate::agent_loop::AgentLoop;
use crate::planner::Planner;
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("goal task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct Agent {
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    memory: Option<Arc<dyn Memory>>,
}

impl Agent {
    pub fn new(registry: Arc<ToolRegistry>, planner: Arc<dyn Planner>) -> Self {
        Self {
            registry,
            planner,
            memory: None,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    fn build_loop(&self, config: AgentConfig, cancel: CancellationToken) -> AgentLoop {
        let agent_loop = AgentLoop::new(Arc::clone(&self.registry), Arc::clone(&self.planner), config)
            .with_cancellation(cancel);
        match &self.memory {
            Some(memory) => agent_loop.with_memory(Arc::clone(memory)),
            None => agent_loop,
        }
    }

    /// Run `goal` to completion on the current task.
    pub async fn run(&self, goal: &Goal, config: AgentConfig) -> AgentResult {
        self.run_with_cancel(goal, config, CancellationToken::new()).await
    }

    /// Run `goal`, stopping between steps once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        goal: &Goal,
        config: AgentConfig,
        cancel: CancellationToken,
    ) -> AgentResult {
        self.build_loop(config, cancel).run(goal).await
    }

    /// Spawn `goal` on the runtime and return a handle to cancel or await it.
    pub fn submit(&self, goal: Goal, config: AgentConfig) -> GoalHandle {
        let cancel = CancellationToken::new();
        let agent_loop = self.build_loop(config, cancel.clone());
        let goal_id = goal.id.clone();
        let task = tokio::spawn(async move { agent_loop.run(&goal).await });
        GoalHandle {
            goal_id,
            cancel,
            task,
        }
    }
}

/// A goal running in the background.
pub struct GoalHandle {
    goal_id: String,
    cancel: CancellationToken,
    task: JoinHandle<AgentResult>,
}

impl GoalHandle {
    pub fn goal_id(&self) -> &str {
        &self.goal_id
    }

    /// Request cancellation; the loop stops at its next step boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<AgentResult, AgentError> {
        Ok(self.task.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use aihelper_core::{InMemoryMemory, Status, TerminationReason};

    use crate::test_support::{finish, registry_with, ScriptedPlanner, ScriptedTool, Step as S};

    #[tokio::test]
    async fn test_run_answers() {
        let agent = Agent::new(
            registry_with(vec![]),
            Arc::new(ScriptedPlanner::new(vec![finish("42")])),
        );
        assert_eq!(agent.planner_name(), "scripted");
        let result = agent.run(&Goal::new("meaning of life"), AgentConfig::default()).await;
        assert_eq!(result.answer.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_submit_and_join() {
        let memory = Arc::new(InMemoryMemory::new());
        let agent = Agent::new(
            registry_with(vec![]),
            Arc::new(ScriptedPlanner::new(vec![finish("done")])),
        )
        .with_memory(memory.clone());

        let goal = Goal::new("background job");
        let handle = agent.submit(goal.clone(), AgentConfig::default());
        assert_eq!(handle.goal_id(), goal.id);

        let result = handle.join().await.unwrap();
        assert_eq!(result.goal_id, goal.id);
        assert_eq!(result.status, Status::Answered);
        assert_eq!(memory.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_then_cancel() {
        let slow = ScriptedTool::read_only(
            "slow",
            (0..10).map(|_| S::Sleep(Duration::from_secs(1))).collect(),
        );
        let agent = Agent::new(
            registry_with(vec![slow]),
            Arc::new(ScriptedPlanner::repeating("slow")),
        );
        let handle = agent.submit(Goal::new("grind"), AgentConfig::default().with_max_steps(10));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.cancel();
        let result = handle.join().await.unwrap();

        assert_eq!(result.reason, TerminationReason::Cancelled);
        assert!(result.trajectory.len() < 10);
    }

    #[tokio::test]
    async fn test_concurrent_goals_have_separate_trajectories() {
        let echo = ScriptedTool::read_only("echo", vec![]);
        let agent = Agent::new(registry_with(vec![echo]), Arc::new(ScriptedPlanner::repeating("echo")));
        let config = AgentConfig::default().with_max_steps(3);

        let a = agent.submit(Goal::new("a"), config.clone());
        let b = agent.submit(Goal::new("b"), config);
        let (a, b) = (a.join().await.unwrap(), b.join().await.unwrap());
        assert_eq!(a.trajectory.len(), 3);
        assert_eq!(b.trajectory.len(), 3);
        assert_ne!(a.goal_id, b.goal_id);
    }
}
