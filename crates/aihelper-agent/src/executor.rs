//! Executor: invokes the tool an action names and turns whatever happens into
//! an [`Observation`].
//!
//! Nothing escapes as an error. Unknown tools, bad arguments, tool failures,
//! panics and timeouts all map onto the closed [`ErrorKind`] taxonomy.
//!
//! # Retry policy
//! - Read-only, retryable tools: up to `max_retries_per_step` retries on
//!   timeout or transient failure, with exponential backoff.
//! - Mutating tools: at most one retry, and only when the spec declares the
//!   tool idempotent *and* the caller passes [`Idempotency::Marked`].
//! - Schema violations and definite failures are never retried.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use aihelper_core::{AgentConfig, Capability, ErrorKind, Observation, ToolCall, ToolSpec};

use crate::tools::{validate, Tool, ToolRegistry};

/// The caller's statement that repeating a mutating call is acceptable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Idempotency {
    NotMarked,
    Marked,
}

impl From<bool> for Idempotency {
    fn from(marked: bool) -> Self {
        if marked {
            Idempotency::Marked
        } else {
            Idempotency::NotMarked
        }
    }
}

/// Outcome of executing one action.
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    /// The deciding (last) attempt.
    pub observation: Observation,
    /// Earlier attempts, oldest first.
    pub retries: Vec<Observation>,
}

impl Execution {
    fn single(observation: Observation) -> Self {
        Self {
            observation,
            retries: Vec::new(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.retries.len() + 1
    }
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, config: &AgentConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
        }
    }

    /// Look the tool up by name and execute it.
    pub async fn execute(&self, call: &ToolCall, timeout: Duration, marker: Idempotency) -> Execution {
        match self.registry.get(&call.tool) {
            Some(tool) => {
                self.execute_spec(call, &tool.spec, Arc::clone(&tool.invoker), timeout, marker)
                    .await
            }
            None => {
                warn!(tool = %call.tool, "tool not found");
                Execution::single(Observation::failure(
                    ErrorKind::ToolNotFound,
                    format!(
                        "unknown tool '{}'; available tools: {}",
                        call.tool,
                        self.registry.names().join(", ")
                    ),
                    Duration::ZERO,
                ))
            }
        }
    }

    /// Execute `call` against an explicit spec and invoker.
    pub async fn execute_spec(
        &self,
        call: &ToolCall,
        spec: &ToolSpec,
        invoker: Arc<dyn Tool>,
        timeout: Duration,
        marker: Idempotency,
    ) -> Execution {
        if let Err(e) = validate(&spec.input_schema, &call.arguments) {
            debug!(tool = %spec.name, error = %e, "arguments rejected");
            return Execution::single(Observation::failure(
                ErrorKind::SchemaViolation,
                format!("invalid arguments for '{}': {e}", spec.name),
                Duration::ZERO,
            ));
        }

        let max_attempts = self.max_attempts(spec, marker);
        let effective = spec.default_timeout.min(timeout);
        let mut retries = Vec::new();

        for attempt in 1..=max_attempts {
            let observation = invoke_once(spec, Arc::clone(&invoker), &call.arguments, effective)
                .await
                .with_attempt(attempt);

            if observation.is_success() || !observation.is_retryable() || attempt == max_attempts {
                info!(
                    tool = %spec.name,
                    ok = observation.is_success(),
                    attempt,
                    latency_ms = observation.latency.as_millis() as u64,
                    "tool executed"
                );
                return Execution {
                    observation,
                    retries,
                };
            }

            let delay = self.config.backoff_for(attempt);
            warn!(
                tool = %spec.name,
                attempt,
                max_attempts,
                error = observation.error.as_deref().unwrap_or(""),
                backoff_ms = delay.as_millis() as u64,
                "retrying tool"
            );
            retries.push(observation);
            tokio::time::sleep(delay).await;
        }

        // max_attempts >= 1, so the loop always returns.
        Execution::single(Observation::failure(
            ErrorKind::RuntimeError,
            "no attempt was made",
            Duration::ZERO,
        ))
    }

    /// Total attempts allowed for `spec` under `marker`.
    pub fn max_attempts(&self, spec: &ToolSpec, marker: Idempotency) -> u32 {
        if !spec.retryable {
            return 1;
        }
        match spec.capability {
            Capability::ReadOnly => 1 + self.config.max_retries_per_step,
            Capability::Mutating => {
                let may_retry = spec.idempotent && marker == Idempotency::Marked
                    && self.config.max_retries_per_step > 0;
                if may_retry {
                    2
                } else {
                    1
                }
            }
        }
    }
}

/// One bounded attempt. The tool runs on its own task so a timeout can abort it
/// and a panic is contained.
async fn invoke_once(
    spec: &ToolSpec,
    invoker: Arc<dyn Tool>,
    args: &Value,
    timeout: Duration,
) -> Observation {
    let started = Instant::now();
    let args = args.clone();
    let mut handle = tokio::spawn(async move { invoker.invoke(args, timeout).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(payload))) => {
            let latency = started.elapsed();
            if let Some(schema) = &spec.output_schema {
                if let Err(e) = validate(schema, &payload) {
                    return Observation::failure(
                        ErrorKind::RuntimeError,
                        format!("'{}' returned output violating its schema: {e}", spec.name),
                        latency,
                    );
                }
            }
            Observation::success(payload, latency)
        }
        Ok(Ok(Err(e))) => Observation::failure(e.kind(), e.to_string(), started.elapsed())
            .with_transient(e.is_transient()),
        Ok(Err(join_err)) => {
            let message = if join_err.is_panic() {
                format!("tool '{}' panicked: {}", spec.name, panic_message(join_err))
            } else {
                format!("tool '{}' was cancelled", spec.name)
            };
            Observation::failure(ErrorKind::RuntimeError, message, started.elapsed())
        }
        Err(_) => {
            handle.abort();
            Observation::failure(
                ErrorKind::Timeout,
                format!("'{}' timed out after {}ms", spec.name, timeout.as_millis()),
                started.elapsed(),
            )
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use aihelper_core::ToolError;

    use crate::test_support::{registry_with, ScriptedTool, Step as S};

    fn config(max_retries: u32) -> AgentConfig {
        AgentConfig::default()
            .with_max_retries(max_retries)
            .with_retry_backoff(Duration::from_millis(100))
    }

    const T: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_unknown_tool_never_invokes() {
        let tool = ScriptedTool::read_only("echo", vec![]);
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(2));

        let out = exec
            .execute(&ToolCall::new("nope", json!({})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::ToolNotFound));
        assert!(out.observation.error.as_deref().unwrap().contains("echo"));
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn test_schema_violation_not_invoked_nor_retried() {
        let tool = ScriptedTool::read_only("echo", vec![]);
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(3));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": 5})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::SchemaViolation));
        assert!(out.retries.is_empty());
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_then_success() {
        let tool = ScriptedTool::read_only(
            "echo",
            vec![
                S::Sleep(Duration::from_secs(120)),
                S::Sleep(Duration::from_secs(120)),
                S::Ok(json!("finally")),
            ],
        );
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(3));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), Duration::from_secs(1), Idempotency::NotMarked)
            .await;

        assert!(out.observation.is_success());
        assert_eq!(out.observation.payload, json!("finally"));
        assert_eq!(out.observation.attempt, 3);
        assert_eq!(out.retries.len(), 2);
        assert!(out
            .retries
            .iter()
            .all(|o| o.error_kind == Some(ErrorKind::Timeout)));
        assert_eq!(tool.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_keeps_last_failure() {
        let tool = ScriptedTool::read_only(
            "echo",
            vec![
                S::Err(ToolError::transient("busy")),
                S::Err(ToolError::transient("busy")),
                S::Err(ToolError::transient("still busy")),
            ],
        );
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(2));

        let started = Instant::now();
        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), T, Idempotency::NotMarked)
            .await;

        assert_eq!(out.observation.error.as_deref(), Some("transient failure: still busy"));
        assert_eq!(out.observation.error_kind, Some(ErrorKind::RuntimeError));
        assert_eq!(out.retries.len(), 2);
        assert_eq!(out.attempts(), 3);
        // 100ms + 200ms of backoff.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_definite_failure_not_retried() {
        let tool = ScriptedTool::read_only("echo", vec![S::Err(ToolError::failed("disk on fire"))]);
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(3));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::RuntimeError));
        assert!(out.retries.is_empty());
        assert_eq!(tool.calls(), 1);
    }

    #[tokio::test]
    async fn test_mutating_non_idempotent_never_retried() {
        let tool = ScriptedTool::mutating("deploy", false, vec![S::Err(ToolError::transient("flaky"))]);
        let registry = registry_with(vec![tool.clone()]);
        let exec = Executor::new(registry, &config(3));

        let out = exec
            .execute(&ToolCall::new("deploy", json!({"text": "x"})), T, Idempotency::Marked)
            .await;
        assert!(out.observation.is_error());
        assert!(out.retries.is_empty());
        assert_eq!(tool.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutating_idempotent_retried_once_only_when_marked() {
        let script = || {
            vec![
                S::Err(ToolError::transient("flaky")),
                S::Err(ToolError::transient("flaky")),
                S::Ok(json!("saved")),
            ]
        };

        let tool = ScriptedTool::mutating("save", true, script());
        let exec = Executor::new(registry_with(vec![tool.clone()]), &config(3));
        let out = exec
            .execute(&ToolCall::new("save", json!({"text": "x"})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(tool.calls(), 1);
        assert!(out.observation.is_error());

        let tool = ScriptedTool::mutating("save", true, script());
        let exec = Executor::new(registry_with(vec![tool.clone()]), &config(3));
        let out = exec
            .execute(&ToolCall::new("save", json!({"text": "x"})), T, Idempotency::Marked)
            .await;
        assert_eq!(tool.calls(), 2);
        assert_eq!(out.retries.len(), 1);
        assert!(out.observation.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_effective_timeout_is_the_smaller() {
        let tool = ScriptedTool::read_only("echo", vec![S::Sleep(Duration::from_secs(5))])
            .with_timeout(Duration::from_secs(2));
        let exec = Executor::new(registry_with(vec![tool.clone()]), &config(0));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), Duration::from_secs(30), Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::Timeout));
        assert!(out.observation.error.as_deref().unwrap().contains("2000ms"));
    }

    #[tokio::test]
    async fn test_panic_becomes_runtime_error() {
        let tool = ScriptedTool::read_only("echo", vec![S::Panic("kaboom")]);
        let exec = Executor::new(registry_with(vec![tool.clone()]), &config(3));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::RuntimeError));
        assert!(out.observation.error.as_deref().unwrap().contains("kaboom"));
        assert!(out.retries.is_empty());
    }

    #[tokio::test]
    async fn test_output_schema_enforced() {
        let tool = ScriptedTool::read_only("echo", vec![S::Ok(json!(42))])
            .with_output_schema(json!({"type": "string"}));
        let exec = Executor::new(registry_with(vec![tool]), &config(0));

        let out = exec
            .execute(&ToolCall::new("echo", json!({"text": "x"})), T, Idempotency::NotMarked)
            .await;
        assert_eq!(out.observation.error_kind, Some(ErrorKind::RuntimeError));
        assert!(out.observation.error.as_deref().unwrap().contains("schema"));
    }

    #[test]
    fn test_max_attempts_table() {
        let exec = Executor::new(Arc::new(ToolRegistry::new()), &config(3));
        let schema = json!({"type": "object"});
        let ro = ToolSpec::new("r", "d", schema.clone());
        let mut_plain = ToolSpec::new("m", "d", schema.clone()).mutating();
        let mut_idem = ToolSpec::new("i", "d", schema.clone()).mutating().with_idempotent(true);
        let no_retry = ToolSpec::new("n", "d", schema).with_retryable(false);

        assert_eq!(exec.max_attempts(&ro, Idempotency::NotMarked), 4);
        assert_eq!(exec.max_attempts(&mut_plain, Idempotency::Marked), 1);
        assert_eq!(exec.max_attempts(&mut_idem, Idempotency::NotMarked), 1);
        assert_eq!(exec.max_attempts(&mut_idem, Idempotency::Marked), 2);
        assert_eq!(exec.max_attempts(&no_retry, Idempotency::Marked), 1);
    }
}
