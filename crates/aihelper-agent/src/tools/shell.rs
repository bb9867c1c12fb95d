//! Shell tool: run a command in a subprocess.
//!
//! Includes a deny-pattern safety guard and optional workspace restriction.
//! The child is killed when the invocation is dropped, so an executor timeout
//! also ends the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use aihelper_core::{Capability, ToolError};

use super::base::{optional_string, require_string, Tool};
use super::filesystem::FsAccess;

/// Maximum output length before truncation (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Dangerous command patterns that are always blocked.
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\bdel\s+/[fq]\b",
    r"\brmdir\s+/s\b",
    r"\b(format|mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:", // fork bomb
];

// ─────────────────────────────────────────────
// ExecTool
// ─────────────────────────────────────────────

pub struct ExecTool {
    working_dir: PathBuf,
    timeout: Duration,
    /// With restriction on, both the `working_dir` argument and any path the
    /// command names must stay inside `working_dir`.
    access: FsAccess,
    deny_regexes: Vec<Regex>,
    abs_path_re: Option<Regex>,
}

impl ExecTool {
    pub fn new(working_dir: PathBuf, timeout: Duration, restrict_to_workspace: bool) -> Self {
        let deny_regexes = DENY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self {
            access: FsAccess::new(working_dir.clone(), restrict_to_workspace),
            working_dir,
            timeout,
            deny_regexes,
            abs_path_re: Regex::new(r#"(?:/[^\s"']+|[A-Za-z]:\\[^\s"']+)"#).ok(),
        }
    }

    /// Returns the reason a command is refused, if it is.
    fn guard_command(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();
        if self.deny_regexes.iter().any(|re| re.is_match(&lower)) {
            warn!(command = command, "command blocked by safety guard");
            return Some("Command blocked by safety guard (dangerous pattern detected)".into());
        }

        if self.access.is_restricted() {
            if command.contains("../") || command.contains("..\\") {
                return Some("Command blocked: path traversal is not allowed in restricted mode".into());
            }
            if let Some(re) = &self.abs_path_re {
                for cap in re.find_iter(command) {
                    if !self.access.contains(Path::new(cap.as_str())) {
                        return Some(format!(
                            "Command references path '{}' outside workspace",
                            cap.as_str()
                        ));
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a shell command or program and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory (defaults to workspace root)"
                }
            },
            "required": ["command"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::Mutating
    }

    fn retryable(&self) -> bool {
        false
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn category(&self) -> &str {
        "system"
    }

    async fn invoke(&self, args: Value, _timeout: Duration) -> Result<Value, ToolError> {
        let command = require_string(&args, "command")?;
        let cwd = match optional_string(&args, "working_dir") {
            Some(dir) if !dir.trim().is_empty() => self.access.resolve(&dir)?,
            _ => self.working_dir.clone(),
        };

        if let Some(reason) = self.guard_command(&command) {
            return Err(ToolError::failed(reason));
        }

        info!(command = %command, cwd = %cwd.display(), "executing shell command");

        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let output = Command::new(shell)
            .args([flag, command.as_str()])
            .current_dir(&cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::failed(format!("Failed to spawn command: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout);
        }
        if !stderr.is_empty() {
            parts.push(format!("STDERR:\n{stderr}"));
        }
        if code != 0 {
            parts.push(format!("Exit code: {code}"));
        }

        let mut combined = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };

        if combined.chars().count() > MAX_OUTPUT_LEN {
            let remaining = combined.chars().count() - MAX_OUTPUT_LEN;
            combined = combined.chars().take(MAX_OUTPUT_LEN).collect();
            combined.push_str(&format!("\n... (truncated, {remaining} more chars)"));
        }

        Ok(Value::String(combined))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
