//! Interactive REPL: one goal per line, all lines in one session.
//!
//! Uses `rustyline` for readline-style editing with persistent history.

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use aihelper_agent::Agent;
use aihelper_core::{AgentConfig, Goal};

use crate::helpers;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Run the interactive REPL loop. Without an explicit `session`, the id of the
/// first goal becomes the session id for the rest.
pub async fn run(
    agent: Agent,
    config: AgentConfig,
    mut session: Option<String>,
    trace: bool,
) -> Result<()> {
    helpers::print_banner(agent.planner_name());

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("Goal: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }
        let _ = editor.add_history_entry(&input);

        let goal = match &session {
            Some(id) => Goal::new(trimmed).with_session(id.clone()),
            None => {
                let goal = Goal::new(trimmed);
                session = Some(goal.id.clone());
                goal
            }
        };
        debug!(goal_id = %goal.id, session = session.as_deref(), "running goal");

        helpers::print_thinking();
        let outcome = helpers::run_goal(&agent, goal, config.clone()).await;
        helpers::clear_thinking();
        match outcome {
            Ok(result) => helpers::print_result(&result, trace),
            Err(e) => eprintln!("\n{} {e}\n", "Error:".red().bold()),
        }
    }

    save_history(&mut editor);
    Ok(())
}

fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }
    Ok(editor)
}

fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn history_path() -> std::path::PathBuf {
    aihelper_core::utils::get_data_path().join("repl_history")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}
