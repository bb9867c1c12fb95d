//! Context builder: turns a goal and its trajectory into a backend prompt.
//!
//! The transcript is rebuilt from the trajectory on every call, so the planner
//! holds no conversation state of its own.

use chrono::Local;
use serde_json::json;

use aihelper_core::utils::truncate_string;
use aihelper_core::{Action, Goal, Step, ToolSpec, Trajectory};
use aihelper_providers::{ChatMessage, PromptContext};

use crate::planner::FINISH_TOOL;
use crate::tools::describe_specs;

/// Longest observation text replayed to the backend (characters).
const DEFAULT_MAX_OBSERVATION_CHARS: usize = 4_000;

pub struct ContextBuilder {
    agent_name: String,
    /// Extra sections appended to the system prompt (preferences, recent goals).
    background: Vec<String>,
    max_observation_chars: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new("AI Helper")
    }
}

impl ContextBuilder {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            background: Vec::new(),
            max_observation_chars: DEFAULT_MAX_OBSERVATION_CHARS,
        }
    }

    /// Add a titled background section (builder pattern).
    pub fn with_background(mut self, title: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.trim().is_empty() {
            self.background.push(format!("## {title}\n{}", body.trim_end()));
        }
        self
    }

    pub fn with_max_observation_chars(mut self, max: usize) -> Self {
        self.max_observation_chars = max;
        self
    }

    /// System prompt: identity, tool catalogue, and the reply protocol.
    pub fn build_system_prompt(&self, tools: &[ToolSpec]) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        let mut prompt = format!(
            "You are {name}, a desktop assistant with access to the user's files, \
             programs and system information.\n\
             Current time: {now}\n\n\
             {catalogue}\n\
             Accomplish the user's goal step by step.\n\n\
             Rules:\n\
             - At each step, choose ONE tool to call next.\n\
             - Reply with ONLY a JSON object, no extra text:\n  \
             {{\"thought\": \"<why this tool>\", \"tool\": \"<tool_name>\", \"args\": {{\"<param>\": \"<value>\"}}}}\n\
             - When the goal is accomplished, reply with:\n  \
             {{\"thought\": \"<summary>\", \"tool\": \"{finish}\", \"args\": {{\"answer\": \"<final answer to user>\"}}}}\n\
             - If a tool fails, try a different approach.\n\
             - Keep thoughts to one sentence.",
            name = self.agent_name,
            catalogue = describe_specs(tools),
            finish = FINISH_TOOL,
        );

        for section in &self.background {
            prompt.push_str("\n\n");
            prompt.push_str(section);
        }
        prompt
    }

    /// Full prompt: system, the goal, then one assistant/user pair per step.
    pub fn build_prompt(&self, goal: &Goal, trajectory: &Trajectory, tools: &[ToolSpec]) -> PromptContext {
        let mut prompt = PromptContext::new(self.build_system_prompt(tools))
            .with_message(ChatMessage::user(goal.text.clone()));

        for step in trajectory.steps() {
            prompt.messages.push(ChatMessage::assistant(render_action(step)));
            if let Some(observation) = &step.observation {
                let text = truncate_string(&observation.render(), self.max_observation_chars);
                prompt.messages.push(ChatMessage::user(format!("Observation: {text}")));
            }
        }
        prompt
    }
}

/// The step's action in the reply protocol, as the backend would have written it.
fn render_action(step: &Step) -> String {
    match &step.action {
        Action::Invoke(call) => json!({
            "thought": step.thought,
            "tool": call.tool,
            "args": call.arguments,
        })
        .to_string(),
        Action::FinalAnswer { answer } => json!({
            "thought": step.thought,
            "tool": FINISH_TOOL,
            "args": { "answer": answer },
        })
        .to_string(),
        Action::Malformed { raw, .. } => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use aihelper_core::{ErrorKind, Observation};
    use aihelper_providers::Role;

    fn specs() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "read_file",
            "Read a file",
            json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        )]
    }

    #[test]
    fn test_system_prompt_lists_tools_and_protocol() {
        let prompt = ContextBuilder::default().build_system_prompt(&specs());
        assert!(prompt.starts_with("You are AI Helper"));
        assert!(prompt.contains("read_file(path: string) - Read a file"));
        assert!(prompt.contains("\"tool\": \"finish\""));
    }

    #[test]
    fn test_background_sections() {
        let prompt = ContextBuilder::new("Helper")
            .with_background("Preferences", "units: metric\n")
            .with_background("Empty", "   ")
            .build_system_prompt(&[]);
        assert!(prompt.contains("## Preferences\nunits: metric"));
        assert!(!prompt.contains("## Empty"));
        assert!(prompt.contains("No tools available."));
    }

    #[test]
    fn test_transcript_rebuilt_from_trajectory() {
        let goal = Goal::new("what's in notes.txt?");
        let mut trajectory = Trajectory::new(5);
        trajectory
            .push(Step::new(
                "read it",
                Action::invoke("read_file", json!({"path": "notes.txt"})),
                Some(Observation::success(json!("buy milk"), Duration::ZERO)),
            ))
            .unwrap();
        trajectory
            .push(Step::new(
                "",
                Action::Malformed {
                    raw: "{\"args\": 1}".into(),
                    reason: "missing tool name".into(),
                },
                Some(Observation::failure(
                    ErrorKind::InvalidAction,
                    "missing tool name",
                    Duration::ZERO,
                )),
            ))
            .unwrap();

        let prompt = ContextBuilder::default().build_prompt(&goal, &trajectory, &specs());
        let roles: Vec<Role> = prompt.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(prompt.messages[0].content, "what's in notes.txt?");

        let replayed: serde_json::Value = serde_json::from_str(&prompt.messages[1].content).unwrap();
        assert_eq!(replayed["tool"], "read_file");
        assert_eq!(prompt.messages[2].content, "Observation: buy milk");
        assert_eq!(prompt.messages[3].content, "{\"args\": 1}");
        assert!(prompt.messages[4].content.contains("invalid_action"));
    }

    #[test]
    fn test_long_observation_truncated() {
        let goal = Goal::new("g");
        let mut trajectory = Trajectory::new(2);
        trajectory
            .push(Step::new(
                "t",
                Action::invoke("read_file", json!({"path": "x"})),
                Some(Observation::success(json!("x".repeat(100)), Duration::ZERO)),
            ))
            .unwrap();
        let prompt = ContextBuilder::default()
            .with_max_observation_chars(10)
            .build_prompt(&goal, &trajectory, &[]);
        assert_eq!(prompt.messages[2].content, "Observation: xxxxxxx...");
    }
}
