//! Scripted planners and tools for exercising the executor and the loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use aihelper_core::{Action, Capability, Goal, ToolError, ToolSpec, Trajectory};

use crate::planner::{Plan, Planner, PlannerError};
use crate::tools::{Tool, ToolRegistry};

/// One scripted tool behaviour.
pub enum Step {
    Ok(Value),
    Err(ToolError),
    Sleep(Duration),
    Panic(&'static str),
}

/// A tool that plays back a script, one entry per call. Once the script runs
/// out every call succeeds with `"ok"`.
#[derive(Clone)]
pub struct ScriptedTool {
    spec: ToolSpec,
    script: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTool {
    fn with_spec(spec: ToolSpec, script: Vec<Step>) -> Self {
        Self {
            spec,
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } }
        })
    }

    pub fn read_only(name: &str, script: Vec<Step>) -> Self {
        Self::with_spec(ToolSpec::new(name, "scripted", Self::schema()), script)
    }

    pub fn mutating(name: &str, idempotent: bool, script: Vec<Step>) -> Self {
        let spec = ToolSpec::new(name, "scripted", Self::schema())
            .mutating()
            .with_idempotent(idempotent);
        Self::with_spec(spec, script)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.spec.default_timeout = timeout;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.spec.output_schema = Some(schema);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.spec.name
    }
    fn description(&self) -> &str {
        &self.spec.description
    }
    fn parameters(&self) -> Value {
        self.spec.input_schema.clone()
    }
    fn output_schema(&self) -> Option<Value> {
        self.spec.output_schema.clone()
    }
    fn capability(&self) -> Capability {
        self.spec.capability
    }
    fn idempotent(&self) -> bool {
        self.spec.idempotent
    }
    fn default_timeout(&self) -> Duration {
        self.spec.default_timeout
    }

    async fn invoke(&self, _args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Step::Ok(v)) => Ok(v),
            Some(Step::Err(e)) => Err(e),
            Some(Step::Sleep(d)) => {
                tokio::time::sleep(d).await;
                Ok(json!("slept"))
            }
            Some(Step::Panic(msg)) => panic!("{msg}"),
            None => Ok(json!("ok")),
        }
    }
}

pub fn registry_with(tools: Vec<ScriptedTool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register_tool(Arc::new(tool)).unwrap();
    }
    Arc::new(registry)
}

/// A planner that plays back a fixed list of plans, then repeats a default.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Result<Plan, PlannerError>>>,
    fallback: Action,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<Result<Plan, PlannerError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Action::final_answer("done"),
            calls: AtomicUsize::new(0),
        }
    }

    /// A planner that invokes `tool` forever.
    pub fn repeating(tool: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Action::invoke(tool, json!({"text": "again"})),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _goal: &Goal,
        _trajectory: &Trajectory,
        _tools: &[ToolSpec],
    ) -> Result<Plan, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Plan::new("keep going", self.fallback.clone())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn invoke(tool: &str) -> Result<Plan, PlannerError> {
    Ok(Plan::new(format!("call {tool}"), Action::invoke(tool, json!({"text": "x"}))))
}

pub fn finish(answer: &str) -> Result<Plan, PlannerError> {
    Ok(Plan::new("done", Action::final_answer(answer)))
}
