//! AI Helper CLI entry point.
//!
//! # Commands
//!
//! - `aihelper agent [-m GOAL] [-s SESSION]`: run one goal, or start the REPL
//! - `aihelper tools`: list the registered tools
//! - `aihelper history [-n N] [--search WORD]`: past goals from memory
//! - `aihelper pref KEY [VALUE]`: read or set a stored preference
//! - `aihelper status`: configuration and backend status
//! - `aihelper onboard`: create config, workspace and memory directories

mod helpers;
mod history;
mod onboard;
mod repl;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use aihelper_core::config::load_config;
use aihelper_core::Goal;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// AI Helper: a goal-driven desktop assistant
#[derive(Parser)]
#[command(name = "aihelper", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal (single-shot) or start an interactive session
    Agent {
        /// Goal to accomplish. Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Continue a prior session
        #[arg(short, long)]
        session: Option<String>,

        /// Override the configured step limit
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print every step of the trajectory
        #[arg(long, default_value_t = false)]
        trace: bool,

        /// Use the rule-based planner even if a backend is configured
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// List available tools
    Tools,

    /// Show past goals
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Only goals mentioning this keyword
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Read or set a stored preference
    Pref {
        key: String,
        value: Option<String>,
    },

    /// Show configuration and backend status
    Status,

    /// Initialize configuration and workspace
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent {
            message,
            session,
            max_steps,
            trace,
            offline,
            logs,
        } => {
            init_logging(logs);
            run_agent(message, session, max_steps, trace, offline).await
        }
        Commands::Tools => list_tools(),
        Commands::History { limit, search } => history::run(limit, search.as_deref()).await,
        Commands::Pref { key, value } => history::preference(&key, value.as_deref()).await,
        Commands::Status => status::run().await,
        Commands::Onboard => onboard::run(),
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

async fn run_agent(
    message: Option<String>,
    session: Option<String>,
    max_steps: Option<usize>,
    trace: bool,
    offline: bool,
) -> Result<()> {
    let config = load_config(None);
    let mut agent_config = config.agent.to_agent_config();
    if let Some(n) = max_steps {
        agent_config = agent_config.with_max_steps(n.max(1));
    }

    let memory = helpers::open_memory(&config).await;
    let agent = helpers::build_agent(&config, memory, offline).await?;

    match message {
        Some(text) => {
            let mut goal = Goal::new(text);
            if let Some(session) = session {
                goal = goal.with_session(session);
            }
            info!(goal_id = %goal.id, "running single goal");

            helpers::print_thinking();
            let result = helpers::run_goal(&agent, goal, agent_config)
                .await
                .context("agent run failed")?;
            helpers::clear_thinking();
            helpers::print_result(&result, trace);
        }
        None => repl::run(agent, agent_config, session, trace).await?,
    }

    Ok(())
}

fn list_tools() -> Result<()> {
    let config = load_config(None);
    let registry = helpers::build_registry(&config)?;
    helpers::print_tools(&registry);
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("aihelper=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
