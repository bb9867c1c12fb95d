//! Tool trait: the uniform contract every capability implements.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use aihelper_core::types::DEFAULT_TOOL_TIMEOUT;
use aihelper_core::{Capability, ToolError, ToolSpec};

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every agent tool implements this trait.
///
/// The registry derives a [`ToolSpec`] from the metadata methods; the executor
/// validates arguments against `parameters()` before calling `invoke()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the planner uses to call this tool (e.g. `"read_file"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the planner.
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments.
    ///
    /// Must be `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    fn output_schema(&self) -> Option<Value> {
        None
    }

    fn capability(&self) -> Capability {
        Capability::ReadOnly
    }

    /// Read-only tools are idempotent unless they say otherwise.
    fn idempotent(&self) -> bool {
        !self.capability().is_mutating()
    }

    fn retryable(&self) -> bool {
        true
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    fn category(&self) -> &str {
        "general"
    }

    /// Run the tool. `args` already passed schema validation; `timeout` is the
    /// bound the executor enforces, passed along for tools that pace themselves.
    async fn invoke(&self, args: Value, timeout: Duration) -> Result<Value, ToolError>;

    /// Build the spec registered for this tool.
    fn to_spec(&self) -> ToolSpec {
        let mut spec = ToolSpec::new(self.name(), self.description(), self.parameters())
            .with_timeout(self.default_timeout())
            .with_retryable(self.retryable())
            .with_category(self.category());
        if self.capability().is_mutating() {
            spec = spec.mutating();
        }
        spec = spec.with_idempotent(self.idempotent());
        if let Some(schema) = self.output_schema() {
            spec = spec.with_output_schema(schema);
        }
        spec
    }
}

// ─────────────────────────────────────────────
// Argument helpers
// ─────────────────────────────────────────────

/// Extract a required `String` argument.
pub fn require_string(args: &Value, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::invalid_arguments(format!("missing required parameter: {key}")))
}

pub fn optional_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

/// Extract an optional boolean argument (defaults to `false` if absent).
pub fn optional_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string() {
        let args = json!({"path": "/tmp/foo.txt", "n": 42});
        assert_eq!(require_string(&args, "path").unwrap(), "/tmp/foo.txt");
        assert!(matches!(
            require_string(&args, "n"),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(require_string(&args, "missing").is_err());
    }

    #[test]
    fn test_optional_helpers() {
        let args = json!({"mode": "fast", "count": 5, "force": true});
        assert_eq!(optional_string(&args, "mode").as_deref(), Some("fast"));
        assert_eq!(optional_i64(&args, "count"), Some(5));
        assert!(optional_bool(&args, "force"));
        assert!(!optional_bool(&args, "missing"));
        assert_eq!(optional_string(&Value::Null, "mode"), None);
    }

    struct Dummy {
        mutating: bool,
    }

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }
        fn description(&self) -> &str {
            "A test tool"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"msg": {"type": "string"}}})
        }
        fn capability(&self) -> Capability {
            if self.mutating {
                Capability::Mutating
            } else {
                Capability::ReadOnly
            }
        }
        fn default_timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn invoke(&self, _args: Value, _timeout: Duration) -> Result<Value, ToolError> {
            Ok(json!("ok"))
        }
    }

    #[test]
    fn test_to_spec_read_only() {
        let spec = Dummy { mutating: false }.to_spec();
        assert_eq!(spec.name, "dummy");
        assert_eq!(spec.capability, Capability::ReadOnly);
        assert!(spec.idempotent);
        assert_eq!(spec.default_timeout, Duration::from_secs(5));
        assert_eq!(spec.input_schema["type"], "object");
    }

    #[test]
    fn test_to_spec_mutating_defaults_not_idempotent() {
        let spec = Dummy { mutating: true }.to_spec();
        assert!(spec.is_mutating());
        assert!(!spec.idempotent);
    }
}
