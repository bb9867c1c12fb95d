//! System information tool: a quick snapshot of the host.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use aihelper_core::ToolError;

use super::base::Tool;

/// Reports OS, architecture, CPU count, working directory and local time.
#[derive(Default)]
pub struct SystemInfoTool;

impl SystemInfoTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Show basic system information (OS, architecture, CPUs, time, working directory)"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "os": { "type": "string" },
                "arch": { "type": "string" },
                "cpus": { "type": "integer" },
                "cwd": { "type": "string" },
                "local_time": { "type": "string" }
            }
        }))
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn category(&self) -> &str {
        "system"
    }

    async fn invoke(&self, _args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        Ok(json!({
            "os": std::env::consts::OS,
            "family": std::env::consts::FAMILY,
            "arch": std::env::consts::ARCH,
            "cpus": cpus,
            "cwd": cwd,
            "local_time": chrono::Local::now().format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        }))
    }
}
