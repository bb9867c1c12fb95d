//! Backend-driven planner speaking the ReAct JSON protocol:
//! `{"thought": "...", "tool": "<name>", "args": {...}}`, with tool `finish`
//! and `args.answer` for the final answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use aihelper_core::utils::truncate_string;
use aihelper_core::{Action, Goal, ToolSpec, Trajectory};
use aihelper_providers::ReasoningBackend;

use super::{Plan, Planner, PlannerError, FINISH_TOOL};
use crate::context::ContextBuilder;

pub struct LlmPlanner {
    backend: Arc<dyn ReasoningBackend>,
    context: ContextBuilder,
}

impl LlmPlanner {
    pub fn new(backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            backend,
            context: ContextBuilder::default(),
        }
    }

    pub fn with_context(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        tools: &[ToolSpec],
    ) -> Result<Plan, PlannerError> {
        let prompt = self.context.build_prompt(goal, trajectory, tools);
        let reply = self.backend.complete(&prompt).await?;
        debug!(
            backend = self.backend.display_name(),
            reply = %truncate_string(reply.trim(), 200),
            "planner reply"
        );
        parse_action(&reply)
    }

    fn name(&self) -> &str {
        self.backend.display_name()
    }
}

/// Span from the first `{` to the last `}`, if any.
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Read a planner reply.
///
/// Markdown fences are stripped and everything from the first `{` to the last
/// `}` is parsed, so two objects in one reply do not parse. No such span, or
/// invalid JSON, is [`PlannerError::Unparseable`]. A JSON object
/// without a usable tool name or with non-object arguments is returned as
/// [`Action::Malformed`].
pub fn parse_action(reply: &str) -> Result<Plan, PlannerError> {
    let text = reply.replace("```json", "").replace("```", "");
    let text = text.trim();

    let Some(raw) = outer_object(text) else {
        return Err(PlannerError::Unparseable(format!(
            "no JSON object in reply: {}",
            truncate_string(text, 120)
        )));
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| PlannerError::Unparseable(format!("invalid JSON: {e}")))?;
    let Some(obj) = value.as_object() else {
        return Err(PlannerError::Unparseable("reply is not a JSON object".into()));
    };

    let thought = obj
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let malformed = |reason: &str| -> Result<Plan, PlannerError> {
        Ok(Plan::new(
            thought.clone(),
            Action::Malformed {
                raw: raw.to_string(),
                reason: reason.to_string(),
            },
        ))
    };

    let tool = match obj.get("tool").and_then(Value::as_str).map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return malformed("missing tool name"),
    };

    let args = match obj.get("args").or_else(|| obj.get("arguments")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => return malformed("args must be a JSON object"),
    };

    if tool.eq_ignore_ascii_case(FINISH_TOOL) {
        return match args.get("answer") {
            Some(Value::String(answer)) => Ok(Plan::new(thought, Action::final_answer(answer.clone()))),
            Some(Value::Null) | None => malformed("finish requires args.answer"),
            Some(other) => Ok(Plan::new(thought, Action::final_answer(other.to_string()))),
        };
    }

    Ok(Plan::new(thought, Action::invoke(tool, args)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use aihelper_providers::{BackendError, PromptContext, Role};

    #[test]
    fn test_parse_tool_call() {
        let plan = parse_action(
            r#"{"thought": "look first", "tool": "list_dir", "args": {"path": "/tmp"}}"#,
        )
        .unwrap();
        assert_eq!(plan.thought, "look first");
        assert_eq!(plan.action, Action::invoke("list_dir", json!({"path": "/tmp"})));
    }

    #[test]
    fn test_parse_strips_fences_and_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"tool\": \"system_info\"}\n```\nHope that helps.";
        let plan = parse_action(reply).unwrap();
        assert_eq!(plan.action, Action::invoke("system_info", json!({})));
        assert_eq!(plan.thought, "");
    }

    #[test]
    fn test_parse_finish() {
        let plan = parse_action(
            r#"{"thought": "done", "tool": "finish", "args": {"answer": "42 files"}}"#,
        )
        .unwrap();
        assert_eq!(plan.action, Action::final_answer("42 files"));
    }

    #[test]
    fn test_parse_finish_without_answer_is_malformed() {
        let plan = parse_action(r#"{"tool": "finish", "args": {}}"#).unwrap();
        assert!(matches!(plan.action, Action::Malformed { ref reason, .. } if reason.contains("answer")));
    }

    #[test]
    fn test_parse_missing_tool_is_malformed() {
        let plan = parse_action(r#"{"thought": "hmm", "args": {"path": "a"}}"#).unwrap();
        match plan.action {
            Action::Malformed { raw, reason } => {
                assert_eq!(reason, "missing tool name");
                assert!(raw.contains("\"path\""));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_non_object_args_is_malformed() {
        let plan = parse_action(r#"{"tool": "read_file", "args": "notes.txt"}"#).unwrap();
        assert!(matches!(plan.action, Action::Malformed { .. }));
    }

    #[test]
    fn test_parse_prose_is_unparseable() {
        let err = parse_action("I think you should check the disk.").unwrap_err();
        assert!(matches!(err, PlannerError::Unparseable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_outer_object_spans_first_to_last_brace() {
        assert_eq!(
            outer_object(r#"ok {"args": {"path": "a"}} done"#),
            Some(r#"{"args": {"path": "a"}}"#)
        );
        assert_eq!(outer_object("} before {"), None);
        assert!(matches!(
            parse_action(r#"{"tool": "a", "args": {}} or {"tool": "b", "args": {}}"#),
            Err(PlannerError::Unparseable(_))
        ));
    }

    #[test]
    fn test_parse_broken_json_is_unparseable() {
        assert!(matches!(
            parse_action("{\"tool\": \"read_file\", "),
            Err(PlannerError::Unparseable(_))
        ));
        assert!(matches!(
            parse_action("{tool: read_file}"),
            Err(PlannerError::Unparseable(_))
        ));
    }

    /// Backend returning canned replies and recording prompts.
    struct CannedBackend {
        replies: Mutex<Vec<Result<String, BackendError>>>,
        prompts: Mutex<Vec<PromptContext>>,
    }

    #[async_trait]
    impl ReasoningBackend for CannedBackend {
        async fn complete(&self, prompt: &PromptContext) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.replies.lock().unwrap().remove(0)
        }
        fn display_name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_llm_planner_round_trip() {
        let backend = Arc::new(CannedBackend {
            replies: Mutex::new(vec![
                Ok(r#"{"thought": "t", "tool": "finish", "args": {"answer": "hi"}}"#.into()),
                Err(BackendError::NotConfigured("no key".into())),
            ]),
            prompts: Mutex::new(Vec::new()),
        });
        let planner = LlmPlanner::new(backend.clone());
        let goal = Goal::new("say hi");
        let trajectory = Trajectory::new(3);

        let plan = planner.plan(&goal, &trajectory, &[]).await.unwrap();
        assert_eq!(plan.action, Action::final_answer("hi"));
        assert_eq!(planner.name(), "canned");

        let err = planner.plan(&goal, &trajectory, &[]).await.unwrap_err();
        assert!(matches!(err, PlannerError::Backend(_)));
        assert!(!err.is_retryable());

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts[0].messages[0].role, Role::User);
        assert_eq!(prompts[0].messages[0].content, "say hi");
    }
}
