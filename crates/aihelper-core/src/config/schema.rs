//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentSettings`, `BackendSettings`, `ToolsConfig`,
//! `MemoryConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{AgentConfig, ErrorKind};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.aihelper/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentSettings,
    pub backend: BackendSettings,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// On-disk form of the loop limits. Converted with [`AgentSettings::to_agent_config`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub step_timeout_secs: u64,
    pub max_retries_per_step: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub error_budget: usize,
    /// Wall-clock budget for a whole goal; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_timeout_secs: Option<u64>,
    /// Error kinds that count toward the budget (snake_case names).
    pub counted_errors: Vec<ErrorKind>,
    pub retry_idempotent_mutations: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(c: &AgentConfig) -> Self {
        Self {
            max_steps: c.max_steps,
            step_timeout_secs: c.step_timeout.as_secs(),
            max_retries_per_step: c.max_retries_per_step,
            retry_backoff_ms: duration_millis(c.retry_backoff),
            max_backoff_ms: duration_millis(c.max_backoff),
            error_budget: c.error_budget,
            goal_timeout_secs: c.goal_timeout.map(|d| d.as_secs()),
            counted_errors: c.counted_errors.clone(),
            retry_idempotent_mutations: c.retry_idempotent_mutations,
        }
    }
}

impl AgentSettings {
    /// Build the runtime configuration. `max_steps` is clamped to at least 1.
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_steps: self.max_steps.max(1),
            step_timeout: Duration::from_secs(self.step_timeout_secs.max(1)),
            max_retries_per_step: self.max_retries_per_step,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.retry_backoff_ms)),
            error_budget: self.error_budget,
            goal_timeout: self.goal_timeout_secs.map(Duration::from_secs),
            counted_errors: self.counted_errors.clone(),
            retry_idempotent_mutations: self.retry_idempotent_mutations,
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────
// Reasoning backend
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server (`/api/chat`).
    #[default]
    Ollama,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    #[serde(alias = "openai_compatible")]
    OpenAi,
}

impl BackendKind {
    pub fn default_api_base(self) -> &'static str {
        match self {
            BackendKind::Ollama => "http://localhost:11434",
            BackendKind::OpenAi => "https://api.openai.com/v1",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Base URL; empty means the default for `kind`.
    pub api_base: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama,
            api_base: String::new(),
            api_key: String::new(),
            model: "llama3".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            request_timeout_secs: 120,
        }
    }
}

impl BackendSettings {
    /// Configured base URL, or the kind's default. Never ends with `/`.
    pub fn resolved_api_base(&self) -> String {
        let base = if self.api_base.trim().is_empty() {
            self.kind.default_api_base()
        } else {
            self.api_base.trim()
        };
        base.trim_end_matches('/').to_string()
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Root for relative paths; empty means the current directory.
    pub workspace: String,
    /// Whether file and exec tools refuse to leave the workspace.
    pub restrict_to_workspace: bool,
    pub exec: ExecToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace: String::new(),
            restrict_to_workspace: false,
            exec: ExecToolConfig::default(),
        }
    }
}

/// Shell exec tool configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecToolConfig {
    /// Command timeout in seconds.
    pub timeout: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

// ─────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Store directory; empty means `~/.aihelper/memory`.
    pub path: String,
    /// How many past goals to show when continuing a session.
    pub recent_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
            recent_limit: 10,
        }
    }
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> std::path::PathBuf {
        if self.path.trim().is_empty() {
            crate::utils::get_memory_path()
        } else {
            crate::utils::expand_home(self.path.trim())
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
