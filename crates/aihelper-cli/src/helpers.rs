//! Shared CLI helpers: wiring the agent from config, running a goal with
//! Ctrl-C cancellation, and printing results.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, warn};

use aihelper_agent::{
    register_builtin_tools, Agent, ContextBuilder, LlmPlanner, Planner, RuleBasedPlanner,
    ToolRegistry,
};
use aihelper_core::config::Config;
use aihelper_core::utils::truncate_string;
use aihelper_core::{
    Action, AgentConfig, AgentResult, Goal, JsonlMemory, Memory, MemoryRecord, Status, Step,
};
use aihelper_providers::{create_backend, ReasoningBackend};

/// Register the built-in tools configured in `config`.
pub fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, &config.tools).context("failed to register tools")?;
    Ok(registry)
}

/// Open the configured memory store. A store that cannot be opened disables
/// memory for this run instead of failing it.
pub async fn open_memory(config: &Config) -> Option<Arc<dyn Memory>> {
    if !config.memory.enabled {
        return None;
    }
    let dir = config.memory.resolved_path();
    match JsonlMemory::open(dir.clone()).await {
        Ok(memory) => Some(Arc::new(memory)),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "memory unavailable, continuing without it");
            None
        }
    }
}

/// Build the agent: the backend-driven planner when the backend answers,
/// otherwise the rule-based one.
pub async fn build_agent(
    config: &Config,
    memory: Option<Arc<dyn Memory>>,
    offline: bool,
) -> Result<Agent> {
    let registry = Arc::new(build_registry(config)?);

    let planner: Arc<dyn Planner> = if offline {
        Arc::new(RuleBasedPlanner::new())
    } else {
        match create_backend(&config.backend) {
            Ok(backend) => {
                if backend.is_available().await {
                    let context = build_context(memory.as_deref(), config.memory.recent_limit).await;
                    Arc::new(LlmPlanner::new(Arc::new(backend)).with_context(context))
                } else {
                    warn!(backend = backend.display_name(), "backend unreachable, using rule-based planner");
                    Arc::new(RuleBasedPlanner::new())
                }
            }
            Err(e) => {
                warn!(error = %e, "backend not configured, using rule-based planner");
                Arc::new(RuleBasedPlanner::new())
            }
        }
    };
    debug!(planner = planner.name(), tools = registry.len(), "agent ready");

    let agent = Agent::new(registry, planner);
    Ok(match memory {
        Some(memory) => agent.with_memory(memory),
        None => agent,
    })
}

/// Prompt context carrying the most recent goals as background.
async fn build_context(memory: Option<&dyn Memory>, recent_limit: usize) -> ContextBuilder {
    let context = ContextBuilder::default();
    let Some(memory) = memory else {
        return context;
    };
    match memory.read_recent(recent_limit).await {
        Ok(records) => context.with_background("Recent goals", recent_goals(&records)),
        Err(e) => {
            warn!(error = %e, "could not read recent goals");
            context
        }
    }
}

fn recent_goals(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|r| {
            let answer = r.result.answer.as_deref().unwrap_or("(no answer)");
            format!(
                "- {} -> {}",
                truncate_string(&r.goal.text, 80),
                truncate_string(answer, 120)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run `goal` in the background; Ctrl-C cancels it at the next step boundary.
pub async fn run_goal(agent: &Agent, goal: Goal, config: AgentConfig) -> Result<AgentResult> {
    let handle = agent.submit(goal, config);
    let cancel = handle.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "cancelling after the current step...".yellow());
            cancel.cancel();
        }
    });

    let result = handle.join().await;
    watcher.abort();
    Ok(result?)
}

// ─────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────

pub fn print_result(result: &AgentResult, trace: bool) {
    if trace {
        println!();
        for step in result.trajectory.steps() {
            println!("{}", format_step(step));
        }
    }

    println!();
    println!("{}", "AI Helper".cyan().bold());
    let text = result.display_text();
    match result.status {
        Status::Answered => println!("{text}"),
        Status::Incomplete => println!("{}", text.yellow()),
        Status::Aborted => println!("{}", text.red()),
    }
    println!(
        "{}",
        format!(
            "{} step(s) in {:.1}s",
            result.trajectory.len(),
            result.elapsed.as_secs_f64()
        )
        .dimmed()
    );
    println!();
}

/// One trajectory step as a single line (plus retries).
pub fn format_step(step: &Step) -> String {
    let action = match &step.action {
        Action::Invoke(call) => format!("{}({})", call.tool, call.arguments),
        Action::FinalAnswer { .. } => "finish".to_string(),
        Action::Malformed { reason, .. } => format!("<malformed: {reason}>"),
    };
    let outcome = match &step.observation {
        Some(obs) if obs.is_success() => format!("ok {}ms", obs.latency.as_millis()).green().to_string(),
        Some(obs) => truncate_string(&obs.render(), 100).red().to_string(),
        None => "answer".green().to_string(),
    };
    let mut line = format!("  {:>2}. {} -> {}", step.number, truncate_string(&action, 80), outcome);
    if !step.retries.is_empty() {
        line.push_str(&format!(" {}", format!("({} retries)", step.retries.len()).dimmed()));
    }
    if !step.thought.is_empty() {
        line.push_str(&format!("\n      {}", truncate_string(&step.thought, 100).dimmed()));
    }
    line
}

pub fn print_tools(registry: &ToolRegistry) {
    println!();
    println!("{}", "Tools".cyan().bold());
    for spec in registry.list() {
        let flag = if spec.is_mutating() {
            "mutating".yellow()
        } else {
            "read-only".green()
        };
        println!(
            "  {:<14} {:<10} {:>4}s  {}",
            spec.name.bold(),
            flag,
            spec.default_timeout.as_secs(),
            spec.description
        );
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner(planner: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "AI Helper".cyan().bold(), version.dimmed());
    println!("{}", format!("planner: {planner}").dimmed());
    println!("{}", "Type a goal, or \"exit\" to quit.".dimmed());
    println!();
}

pub fn print_thinking() {
    eprint!("{}", "working...".dimmed());
}

pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

/// Shorten a path under the home directory to `~/...` for display.
pub fn display_path(path: &Path) -> String {
    if let Some(home) = dirs_next::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return Path::new("~").join(rest).display().to_string();
        }
    }
    path.display().to_string()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use serde_json::json;

    use aihelper_core::{ErrorKind, Observation, TerminationReason, Trajectory};

    #[test]
    fn test_display_path_home() {
        if let Some(home) = dirs_next::home_dir() {
            assert_eq!(display_path(&home.join("notes")), "~/notes");
        }
        assert_eq!(display_path(&PathBuf::from("/opt/x")), "/opt/x");
    }

    #[test]
    fn test_format_step() {
        colored::control::set_override(false);
        let mut step = Step::new(
            "check it",
            Action::invoke("read_file", json!({"path": "a.txt"})),
            Some(Observation::failure(ErrorKind::Timeout, "slow", Duration::ZERO)),
        )
        .with_retries(vec![Observation::failure(ErrorKind::Timeout, "slow", Duration::ZERO)]);
        step.number = 3;

        let line = format_step(&step);
        assert!(line.starts_with("   3. read_file({\"path\":\"a.txt\"})"));
        assert!(line.contains("Error (timeout): slow"));
        assert!(line.contains("(1 retries)"));
        assert!(line.contains("check it"));
    }

    #[test]
    fn test_recent_goals_background() {
        let goal = Goal::new("what time is it");
        let result = AgentResult::new(
            goal.id.clone(),
            TerminationReason::FinalAnswer,
            Some("noon".into()),
            Trajectory::new(1),
            Duration::ZERO,
        );
        let record = MemoryRecord::new(&goal, &result.trajectory, &result);
        assert_eq!(recent_goals(&[record]), "- what time is it -> noon");
    }

    #[test]
    fn test_build_registry_from_default_config() {
        let registry = build_registry(&Config::default()).unwrap();
        assert!(registry.has("read_file"));
        assert!(registry.has("exec"));
    }
}
