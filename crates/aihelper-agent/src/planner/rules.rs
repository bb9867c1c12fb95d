//! Offline planner: ordered keyword rules instead of a reasoning backend.
//!
//! Picks one tool from the goal text, invokes it once, then finishes with what
//! that tool returned. Used when no backend is reachable.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use aihelper_core::{Action, Goal, ToolSpec, Trajectory};

use super::{Plan, Planner, PlannerError};

const FALLBACK_TOOL: &str = "system_info";
const FALLBACK_THOUGHT: &str = "No specific tool matched; showing system information";

/// More specific patterns come first.
const RULES: &[(&str, &str)] = &[
    (r"\bread\b.+file|\bopen\b.+file|contents?\s+of|\bshow\b.+\.\w{1,5}\b", "read_file"),
    (r"\bappend\b.+\bto\b", "append_file"),
    (r"\bwrite\b.+\bto\b|\bsave\b.+file|\bcreate\b.+file", "write_file"),
    (r"\b(search|find)\b.+files?|look\s+for.+files?", "search_files"),
    (r"\blist\b.+(files?|folders?|dir)|what.+\bin\b.+(dir|folder)|\bls\b", "list_dir"),
    (r"\brun\b|\bexecute\b|\blaunch\b", "exec"),
    (r"\bcpu\b|\bmemory\b|\bdisk\b|system\s+(info|stat)|\bos\b|what time|\bhostname\b", "system_info"),
];

pub struct RuleBasedPlanner {
    rules: Vec<(Regex, &'static str)>,
    quoted_re: Option<Regex>,
    path_re: Option<Regex>,
    filename_re: Option<Regex>,
    glob_re: Option<Regex>,
    command_re: Option<Regex>,
}

impl Default for RuleBasedPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedPlanner {
    pub fn new() -> Self {
        Self {
            rules: RULES
                .iter()
                .filter_map(|(p, tool)| Regex::new(p).ok().map(|re| (re, *tool)))
                .collect(),
            quoted_re: Regex::new(r#""([^"]+)"|'([^']+)'"#).ok(),
            path_re: Regex::new(r"([A-Za-z]:[\\/][^\s,]+|/[^\s,]+|~/[^\s,]+)").ok(),
            filename_re: Regex::new(r"\b[\w.-]+\.\w{1,5}\b").ok(),
            glob_re: Regex::new(r"[\w.-]*\*[\w.*-]*").ok(),
            command_re: Regex::new(r"(?i)\b(?:run|execute|launch)\s+(\S+)").ok(),
        }
    }

    fn first_quoted(&self, goal: &str) -> Option<String> {
        let caps = self.quoted_re.as_ref()?.captures(goal)?;
        caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
    }

    fn find(re: &Option<Regex>, goal: &str) -> Option<String> {
        re.as_ref()?.find(goal).map(|m| m.as_str().to_string())
    }

    /// Best-effort argument extraction from free text.
    fn extract_args(&self, tool: &str, goal: &str) -> Value {
        let quoted = self.first_quoted(goal);
        let path = Self::find(&self.path_re, goal);
        let filename = || Self::find(&self.filename_re, goal);

        match tool {
            "read_file" => {
                let target = path
                    .or_else(|| quoted.clone())
                    .or_else(filename)
                    .unwrap_or_else(|| goal.to_string());
                json!({ "path": target })
            }
            "write_file" | "append_file" => {
                let target = path.or_else(filename).unwrap_or_else(|| "output.txt".into());
                json!({ "path": target, "content": quoted.unwrap_or_default() })
            }
            "search_files" => {
                let query = Self::find(&self.glob_re, goal)
                    .or_else(filename)
                    .or(quoted)
                    .unwrap_or_else(|| "*".into());
                match path {
                    Some(root) => json!({ "query": query, "root": root }),
                    None => json!({ "query": query }),
                }
            }
            "list_dir" => json!({ "path": path.or(quoted).unwrap_or_else(|| ".".into()) }),
            "exec" => {
                let command = quoted
                    .or_else(|| {
                        let caps = self.command_re.as_ref()?.captures(goal)?;
                        caps.get(1).map(|m| m.as_str().to_string())
                    })
                    .unwrap_or_default();
                json!({ "command": command })
            }
            _ => json!({}),
        }
    }
}

#[async_trait]
impl Planner for RuleBasedPlanner {
    async fn plan(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        tools: &[ToolSpec],
    ) -> Result<Plan, PlannerError> {
        // One tool call, then report what it returned.
        if let Some(step) = trajectory.last() {
            let tool = step.action.tool_name().unwrap_or("the tool");
            let answer = match &step.observation {
                Some(obs) if obs.is_success() && step.thought == FALLBACK_THOUGHT => format!(
                    "I'm not sure how to handle that request yet, but here is the current system information:\n\n{}",
                    obs.render()
                ),
                Some(obs) if obs.is_success() => obs.render(),
                Some(obs) => format!("I tried `{tool}` but it failed: {}", obs.render()),
                None => "Done.".to_string(),
            };
            return Ok(Plan::new(
                format!("Reporting the result of {tool}"),
                Action::final_answer(answer),
            ));
        }

        let available = |name: &str| tools.iter().any(|t| t.name == name);
        let lower = goal.text.to_lowercase();

        for (re, tool) in &self.rules {
            if available(tool) && re.is_match(&lower) {
                return Ok(Plan::new(
                    format!("Goal matches the pattern for {tool}"),
                    Action::invoke(*tool, self.extract_args(tool, &goal.text)),
                ));
            }
        }

        if available(FALLBACK_TOOL) {
            return Ok(Plan::new(
                FALLBACK_THOUGHT,
                Action::invoke(FALLBACK_TOOL, json!({})),
            ));
        }
        Ok(Plan::new(
            "No tool matched the goal",
            Action::final_answer("Sorry, I don't know how to help with that without a reasoning backend."),
        ))
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}
