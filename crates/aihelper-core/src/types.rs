//! Core types for the agent: goals, tool contracts, actions and observations.
//!
//! Tool input is untyped JSON (`serde_json::Value`) because tools are external
//! capabilities; everything the loop itself reasons about (capabilities, error
//! kinds, termination reasons) is a closed Rust enum.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trajectory::Trajectory;

/// Context key under which a prior session id travels with a goal.
pub const SESSION_ID_KEY: &str = "session_id";

// ─────────────────────────────────────────────
// Goal
// ─────────────────────────────────────────────

/// A natural-language request submitted to the agent.
///
/// Built once with [`Goal::new`] and the `with_*` builders, then handed to the
/// loop by value or reference; nothing mutates it afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    /// Unique goal id (UUID v4).
    pub id: String,
    /// The request text as the user phrased it.
    pub text: String,
    /// Optional structured context (e.g. `session_id`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    /// When the goal was accepted.
    pub submitted_at: DateTime<Utc>,
}

impl Goal {
    /// Create a goal with a fresh id and no context.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            context: HashMap::new(),
            submitted_at: Utc::now(),
        }
    }

    /// Attach a context entry (builder pattern).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach the id of a prior session this goal continues.
    pub fn with_session(self, session_id: impl Into<String>) -> Self {
        self.with_context(SESSION_ID_KEY, session_id)
    }

    /// The prior session id, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.context.get(SESSION_ID_KEY).map(String::as_str)
    }
}

// ─────────────────────────────────────────────
// Tool contract
// ─────────────────────────────────────────────

/// Whether a tool only reads state or may change it. Governs retry safety.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadOnly,
    Mutating,
}

impl Capability {
    pub fn is_mutating(self) -> bool {
        matches!(self, Capability::Mutating)
    }
}

/// Default bounded wait for a tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Declarative description of a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Unique name the planner uses to call the tool (e.g. `"read_file"`).
    pub name: String,
    /// Human-readable description shown to the planner.
    pub description: String,
    /// JSON Schema of the arguments; always an object schema.
    pub input_schema: Value,
    /// JSON Schema of the payload, if the tool declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    pub capability: Capability,
    /// Bounded wait applied when the caller does not ask for less.
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// Whether timeouts and transient failures may be retried at all.
    pub retryable: bool,
    /// Whether repeating the call has the same effect as calling it once.
    pub idempotent: bool,
    /// Grouping used when listing tools.
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl ToolSpec {
    /// A read-only, retryable, idempotent spec with the default timeout.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema: None,
            capability: Capability::ReadOnly,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            retryable: true,
            idempotent: true,
            category: default_category(),
        }
    }

    /// Mark the tool as mutating. Mutating tools are not idempotent unless
    /// [`ToolSpec::with_idempotent`] says otherwise.
    pub fn mutating(mut self) -> Self {
        self.capability = Capability::Mutating;
        self.idempotent = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.capability.is_mutating()
    }

    /// Compact one-line description for planner prompts:
    /// `read_file(path: string, limit?: integer) - Read a file [read-only]`.
    pub fn describe(&self) -> String {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params: Vec<String> = Vec::new();
        if let Some(props) = self.input_schema.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let ty = prop.get("type").and_then(Value::as_str).unwrap_or("any");
                let marker = if required.contains(&name.as_str()) { "" } else { "?" };
                params.push(format!("{name}{marker}: {ty}"));
            }
        }

        let flag = match self.capability {
            Capability::ReadOnly => "read-only",
            Capability::Mutating => "mutating",
        };
        format!(
            "{}({}) - {} [{flag}]",
            self.name,
            params.join(", "),
            self.description
        )
    }
}

// ─────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────

/// A request to invoke a tool by name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// What the planner decided to do next.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Invoke a tool.
    Invoke(ToolCall),
    /// Terminal answer; no tool is invoked.
    FinalAnswer { answer: String },
    /// Parseable planner output that does not describe a valid action.
    Malformed { raw: String, reason: String },
}

impl Action {
    pub fn invoke(tool: impl Into<String>, arguments: Value) -> Self {
        Action::Invoke(ToolCall::new(tool, arguments))
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        Action::FinalAnswer {
            answer: answer.into(),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Action::FinalAnswer { .. })
    }

    /// The tool this action names, if it is an invocation.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Action::Invoke(call) => Some(&call.tool),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────
// Observations
// ─────────────────────────────────────────────

/// Closed taxonomy of failures surfaced to the planner.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolNotFound,
    SchemaViolation,
    Timeout,
    RuntimeError,
    InvalidAction,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::ToolNotFound,
        ErrorKind::SchemaViolation,
        ErrorKind::Timeout,
        ErrorKind::RuntimeError,
        ErrorKind::InvalidAction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::InvalidAction => "invalid_action",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

/// The recorded result of one tool attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub outcome: Outcome,
    /// Tool output on success; `null` on error.
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The failure was classified as transient (safe to retry).
    #[serde(default)]
    pub transient: bool,
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    /// 1-based attempt number within its step.
    pub attempt: u32,
}

impl Observation {
    pub fn success(payload: Value, latency: Duration) -> Self {
        Self {
            outcome: Outcome::Success,
            payload,
            error_kind: None,
            error: None,
            transient: false,
            latency,
            attempt: 1,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>, latency: Duration) -> Self {
        Self {
            outcome: Outcome::Error,
            payload: Value::Null,
            error_kind: Some(kind),
            error: Some(message.into()),
            transient: false,
            latency,
            attempt: 1,
        }
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::Error
    }

    /// Timeouts and transient failures may be retried; nothing else.
    pub fn is_retryable(&self) -> bool {
        self.is_error() && (self.error_kind == Some(ErrorKind::Timeout) || self.transient)
    }

    /// Text form fed back to the planner and used for partial answers.
    pub fn render(&self) -> String {
        match self.outcome {
            Outcome::Success => match &self.payload {
                Value::String(s) => s.clone(),
                Value::Null => "(no output)".to_string(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            },
            Outcome::Error => {
                let kind = self.error_kind.map_or("error", ErrorKind::as_str);
                let message = self.error.as_deref().unwrap_or("unknown failure");
                format!("Error ({kind}): {message}")
            }
        }
    }
}

// ─────────────────────────────────────────────
// AgentConfig
// ─────────────────────────────────────────────

/// Limits and policies for one goal run.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// Upper bound on recorded steps.
    pub max_steps: usize,
    /// Upper bound on a single tool invocation (a tool's own timeout may be shorter).
    pub step_timeout: Duration,
    /// Extra attempts for retryable tool failures; also the planner attempt budget.
    pub max_retries_per_step: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_backoff: Duration,
    /// Cap on a single backoff delay.
    pub max_backoff: Duration,
    /// Cumulative counted errors tolerated before aborting.
    pub error_budget: usize,
    /// Optional wall-clock budget for the whole goal.
    pub goal_timeout: Option<Duration>,
    /// Error kinds that count toward `error_budget`.
    pub counted_errors: Vec<ErrorKind>,
    /// Caller-side idempotency marker: allow one retry of mutating tools
    /// whose spec declares them idempotent. Off unless the caller opts in.
    pub retry_idempotent_mutations: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_timeout: Duration::from_secs(60),
            max_retries_per_step: 2,
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            error_budget: 3,
            goal_timeout: None,
            counted_errors: ErrorKind::ALL.to_vec(),
            retry_idempotent_mutations: false,
        }
    }
}

impl AgentConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries_per_step = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_error_budget(mut self, budget: usize) -> Self {
        self.error_budget = budget;
        self
    }

    pub fn with_goal_timeout(mut self, timeout: Duration) -> Self {
        self.goal_timeout = Some(timeout);
        self
    }

    pub fn with_counted_errors(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.counted_errors = kinds;
        self
    }

    /// Whether an error of `kind` consumes error budget.
    pub fn counts_toward_budget(&self, kind: ErrorKind) -> bool {
        self.counted_errors.contains(&kind)
    }

    /// Delay before retry number `retry` (1-based): `retry_backoff * 2^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Attempts the loop makes at getting a parseable plan (never less than one).
    pub fn planner_attempts(&self) -> u32 {
        self.max_retries_per_step.max(1)
    }
}

// ─────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Answered,
    Incomplete,
    Aborted,
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    FinalAnswer,
    StepLimit,
    ErrorBudgetExhausted,
    PlannerFailure,
    Cancelled,
    GoalTimeout,
}

impl TerminationReason {
    pub fn status(self) -> Status {
        match self {
            TerminationReason::FinalAnswer => Status::Answered,
            TerminationReason::StepLimit => Status::Incomplete,
            TerminationReason::ErrorBudgetExhausted
            | TerminationReason::PlannerFailure
            | TerminationReason::Cancelled
            | TerminationReason::GoalTimeout => Status::Aborted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::FinalAnswer => "final_answer",
            TerminationReason::StepLimit => "step_limit",
            TerminationReason::ErrorBudgetExhausted => "error_budget_exhausted",
            TerminationReason::PlannerFailure => "planner_failure",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::GoalTimeout => "goal_timeout",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of running one goal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub goal_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub trajectory: Trajectory,
    pub reason: TerminationReason,
    /// Human-readable diagnosis for aborted runs (never a raw error object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl AgentResult {
    /// Build a result; the status follows from the reason.
    pub fn new(
        goal_id: impl Into<String>,
        reason: TerminationReason,
        answer: Option<String>,
        trajectory: Trajectory,
        elapsed: Duration,
    ) -> Self {
        Self {
            goal_id: goal_id.into(),
            status: reason.status(),
            answer,
            trajectory,
            reason,
            detail: None,
            elapsed,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_answered(&self) -> bool {
        self.status == Status::Answered
    }

    /// Text to show the user regardless of status.
    pub fn display_text(&self) -> String {
        match (&self.status, &self.answer) {
            (Status::Answered, Some(answer)) => answer.clone(),
            (Status::Incomplete, Some(partial)) => {
                format!("(incomplete: {}) {partial}", self.reason)
            }
            (Status::Incomplete, None) => {
                format!("I could not complete the goal ({}).", self.reason)
            }
            (_, _) => match &self.detail {
                Some(detail) => format!("Aborted ({}): {detail}", self.reason),
                None => format!("Aborted ({}).", self.reason),
            },
        }
    }
}

/// Millisecond (de)serialization for `Duration` fields.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
