//! Config loader: reads `~/.aihelper/config.json`, applies legacy
//! migrations, then env var overrides.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.aihelper/config.json`
//! 3. Environment variables `AIHELPER_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::{BackendKind, Config};
use crate::types::ErrorKind;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) plus env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(load_config_from_path(&config_path))
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return Config::default();
        }
    };

    migrate_config(&mut raw);

    match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Renames `agent.maxIterations` → `agent.maxSteps` unless `maxSteps` is set.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(agent) = raw.get_mut("agent").and_then(|a| a.as_object_mut()) else {
        return;
    };
    if let Some(legacy) = agent.remove("maxIterations") {
        if !agent.contains_key("maxSteps") {
            agent.insert("maxSteps".to_string(), legacy);
            debug!("Migrated agent.maxIterations → agent.maxSteps");
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `AIHELPER_<SECTION>__<FIELD>`. Unparseable values are ignored.
fn apply_env_overrides(mut config: Config) -> Config {
    // Agent
    if let Some(n) = env_parse::<usize>("AIHELPER_AGENT__MAX_STEPS") {
        config.agent.max_steps = n;
    }
    if let Some(n) = env_parse::<u64>("AIHELPER_AGENT__STEP_TIMEOUT_SECS") {
        config.agent.step_timeout_secs = n;
    }
    if let Some(n) = env_parse::<u32>("AIHELPER_AGENT__MAX_RETRIES_PER_STEP") {
        config.agent.max_retries_per_step = n;
    }
    if let Some(n) = env_parse::<usize>("AIHELPER_AGENT__ERROR_BUDGET") {
        config.agent.error_budget = n;
    }
    if let Some(n) = env_parse::<u64>("AIHELPER_AGENT__GOAL_TIMEOUT_SECS") {
        config.agent.goal_timeout_secs = Some(n);
    }
    if let Ok(val) = std::env::var("AIHELPER_AGENT__COUNTED_ERRORS") {
        let kinds: Result<Vec<ErrorKind>, _> = val
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect();
        match kinds {
            Ok(kinds) => config.agent.counted_errors = kinds,
            Err(e) => warn!("Ignoring AIHELPER_AGENT__COUNTED_ERRORS: {}", e),
        }
    }

    // Backend
    if let Ok(val) = std::env::var("AIHELPER_BACKEND__KIND") {
        match val.to_ascii_lowercase().as_str() {
            "ollama" => config.backend.kind = BackendKind::Ollama,
            "openai" => config.backend.kind = BackendKind::OpenAi,
            other => warn!("Ignoring unknown backend kind: {}", other),
        }
    }
    if let Ok(val) = std::env::var("AIHELPER_BACKEND__API_BASE") {
        config.backend.api_base = val;
    }
    if let Ok(val) = std::env::var("AIHELPER_BACKEND__API_KEY") {
        config.backend.api_key = val;
    }
    if let Ok(val) = std::env::var("AIHELPER_BACKEND__MODEL") {
        config.backend.model = val;
    }
    if let Some(t) = env_parse::<f64>("AIHELPER_BACKEND__TEMPERATURE") {
        config.backend.temperature = t;
    }

    // Tools
    if let Ok(val) = std::env::var("AIHELPER_TOOLS__WORKSPACE") {
        config.tools.workspace = val;
    }
    if let Ok(val) = std::env::var("AIHELPER_TOOLS__RESTRICT_TO_WORKSPACE") {
        config.tools.restrict_to_workspace = val == "true" || val == "1";
    }

    // Memory
    if let Ok(val) = std::env::var("AIHELPER_MEMORY__ENABLED") {
        config.memory.enabled = val == "true" || val == "1";
    }
    if let Ok(val) = std::env::var("AIHELPER_MEMORY__PATH") {
        config.memory.path = val;
    }

    config
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", key, val);
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.backend.model, "llama3");
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "agent": { "maxSteps": 4, "errorBudget": 1 },
            "backend": { "kind": "openai", "model": "gpt-4o-mini" }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.agent.error_budget, 1);
        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(config.backend.model, "gpt-4o-mini");
        // Default preserved
        assert_eq!(config.agent.max_retries_per_step, 2);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_steps, 10);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.backend.model = "mistral".to_string();
        config.agent.goal_timeout_secs = Some(300);

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.backend.model, "mistral");
        assert_eq!(reloaded.agent.goal_timeout_secs, Some(300));
    }

    #[test]
    fn test_migrate_max_iterations() {
        let file = write_temp_json(r#"{ "agent": { "maxIterations": 7 } }"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_steps, 7);
    }

    #[test]
    fn test_migrate_no_overwrite() {
        let file = write_temp_json(r#"{ "agent": { "maxIterations": 7, "maxSteps": 3 } }"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_steps, 3);
    }

    #[test]
    fn test_env_override_backend_model() {
        std::env::set_var("AIHELPER_BACKEND__MODEL", "phi3");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.backend.model, "phi3");
        std::env::remove_var("AIHELPER_BACKEND__MODEL");
    }

    #[test]
    fn test_env_override_counted_errors() {
        std::env::set_var("AIHELPER_AGENT__COUNTED_ERRORS", "timeout, invalid_action");
        let config = apply_env_overrides(Config::default());
        assert_eq!(
            config.agent.counted_errors,
            vec![ErrorKind::Timeout, ErrorKind::InvalidAction]
        );
        std::env::remove_var("AIHELPER_AGENT__COUNTED_ERRORS");
    }

    #[test]
    fn test_env_override_bad_number_ignored() {
        std::env::set_var("AIHELPER_AGENT__ERROR_BUDGET", "lots");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.agent.error_budget, 3);
        std::env::remove_var("AIHELPER_AGENT__ERROR_BUDGET");
    }
}
