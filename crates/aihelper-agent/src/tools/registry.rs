//! Tool registry: name → spec + invoker.
//!
//! Built once at startup, then shared read-only (`Arc<ToolRegistry>`) by every
//! goal run. Registration errors are fatal configuration errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use aihelper_core::ToolSpec;

use super::base::Tool;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
    #[error("invalid spec for tool '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },
    #[error("tool '{0}' not found")]
    NotFound(String),
}

/// A registered tool: its declared spec and the invoker behind it.
#[derive(Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub invoker: Arc<dyn Tool>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("spec", &self.spec.name)
            .finish()
    }
}

/// Stores tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `invoker` under `spec`. Rejects duplicate names, empty names,
    /// and input schemas that are not object schemas.
    pub fn register(&mut self, spec: ToolSpec, invoker: Arc<dyn Tool>) -> Result<(), RegistryError> {
        check_spec(&spec)?;
        if self.tools.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        info!(
            tool = %spec.name,
            capability = ?spec.capability,
            timeout_ms = spec.default_timeout.as_millis() as u64,
            "registered tool"
        );
        self.tools
            .insert(spec.name.clone(), RegisteredTool { spec, invoker });
        Ok(())
    }

    /// Register a tool under the spec it declares about itself.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let spec = tool.to_spec();
        self.register(spec, tool)
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        self.tools
            .get(name)
            .map(|t| &t.spec)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All specs, sorted by name for determinism.
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Catalogue text for planner prompts, grouped by category.
    pub fn describe_all(&self) -> String {
        describe_specs(&self.list())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Render `specs` as the `Available tools:` catalogue, grouped by category.
pub fn describe_specs(specs: &[ToolSpec]) -> String {
    if specs.is_empty() {
        return "No tools available.".to_string();
    }
    let mut by_category: BTreeMap<&str, Vec<&ToolSpec>> = BTreeMap::new();
    for spec in specs {
        by_category.entry(spec.category.as_str()).or_default().push(spec);
    }

    let mut out = String::from("Available tools:\n");
    for (category, mut group) in by_category {
        group.sort_by(|a, b| a.name.cmp(&b.name));
        out.push_str(&format!("\n[{category}]\n"));
        for spec in group {
            out.push_str(&format!("  {}\n", spec.describe()));
        }
    }
    out
}

fn check_spec(spec: &ToolSpec) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidSpec {
        name: spec.name.clone(),
        reason: reason.to_string(),
    };

    if spec.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if spec.name.eq_ignore_ascii_case(crate::planner::FINISH_TOOL) {
        return Err(invalid("name is reserved for final answers"));
    }
    let Some(schema) = spec.input_schema.as_object() else {
        return Err(invalid("input schema must be a JSON object"));
    };
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(invalid("input schema must have type \"object\""));
    }
    if spec.default_timeout.is_zero() {
        return Err(invalid("default timeout must be positive"));
    }
    Ok(())
}
