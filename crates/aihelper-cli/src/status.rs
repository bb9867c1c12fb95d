//! `aihelper status`: configuration, backend reachability and agent limits.

use anyhow::Result;
use colored::Colorize;

use aihelper_core::config::{get_config_path, load_config};
use aihelper_providers::{create_backend, ReasoningBackend};

use crate::helpers::display_path;

fn check(ok: bool, missing: &str) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        missing.red().to_string()
    }
}

pub async fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "AI Helper Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        display_path(&config_path),
        check(config_path.exists(), "(not found, using defaults)")
    );

    let workspace = if config.tools.workspace.trim().is_empty() {
        std::env::current_dir().unwrap_or_default()
    } else {
        aihelper_core::utils::expand_home(config.tools.workspace.trim())
    };
    println!(
        "  {:<18} {} {}",
        "Workspace:".bold(),
        display_path(&workspace),
        check(workspace.exists(), "(not found)")
    );

    // Backend
    println!();
    let backend = &config.backend;
    println!("  {:<18} {:?} / {}", "Backend:".bold(), backend.kind, backend.model);
    println!("  {:<18} {}", "API base:".bold(), backend.resolved_api_base());
    let reachable = match create_backend(backend) {
        Ok(client) => check(client.is_available().await, "unreachable (rule-based fallback)"),
        Err(e) => format!("{} {e}", "✗".red()),
    };
    println!("  {:<18} {}", "Reachable:".bold(), reachable);

    // Memory
    println!();
    let memory = if config.memory.enabled {
        display_path(&config.memory.resolved_path())
    } else {
        "disabled".dimmed().to_string()
    };
    println!("  {:<18} {}", "Memory:".bold(), memory);

    // Limits
    let agent = config.agent.to_agent_config();
    println!(
        "  {:<18} {}",
        "Limits:".bold(),
        format!(
            "max_steps: {} | retries: {} | error_budget: {} | step_timeout: {}s",
            agent.max_steps,
            agent.max_retries_per_step,
            agent.error_budget,
            agent.step_timeout.as_secs()
        )
        .dimmed()
    );
    println!();

    Ok(())
}
