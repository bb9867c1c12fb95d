//! `aihelper history` and `aihelper pref`: read-side views of memory.

use anyhow::{bail, Context, Result};
use chrono::Local;
use colored::Colorize;

use aihelper_core::config::load_config;
use aihelper_core::utils::truncate_string;
use aihelper_core::{Memory, MemoryRecord, Status};

use crate::helpers;

pub async fn run(limit: usize, search: Option<&str>) -> Result<()> {
    let config = load_config(None);
    let Some(memory) = helpers::open_memory(&config).await else {
        bail!("memory is disabled in the configuration");
    };

    let records = match search {
        Some(keyword) => memory.search(keyword, limit).await,
        None => memory.read_recent(limit).await,
    }
    .context("failed to read history")?;

    println!();
    if records.is_empty() {
        println!("{}", "(no goals recorded yet)".dimmed());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    println!();
    Ok(())
}

pub async fn preference(key: &str, value: Option<&str>) -> Result<()> {
    let config = load_config(None);
    let Some(memory) = helpers::open_memory(&config).await else {
        bail!("memory is disabled in the configuration");
    };

    match value {
        Some(value) => {
            memory
                .set_preference(key, value)
                .await
                .with_context(|| format!("failed to store preference {key}"))?;
            println!("{} {key} = {value}", "✓".green());
        }
        None => match memory.get_preference(key).await? {
            Some(value) => println!("{value}"),
            None => println!("{}", format!("{key} is not set").dimmed()),
        },
    }
    Ok(())
}

fn format_record(record: &MemoryRecord) -> String {
    let when = record.recorded_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let status = match record.result.status {
        Status::Answered => "answered".green(),
        Status::Incomplete => "incomplete".yellow(),
        Status::Aborted => "aborted".red(),
    };
    let answer = record.result.answer.as_deref().unwrap_or("");
    format!(
        "{} {:<10} {}\n    {}",
        when.to_string().dimmed(),
        status,
        truncate_string(&record.goal.text, 70).bold(),
        truncate_string(answer, 100)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use aihelper_core::{AgentResult, Goal, TerminationReason, Trajectory};

    #[test]
    fn test_format_record() {
        colored::control::set_override(false);
        let goal = Goal::new("free disk space?");
        let result = AgentResult::new(
            goal.id.clone(),
            TerminationReason::StepLimit,
            Some("about 20 GB".into()),
            Trajectory::new(2),
            Duration::ZERO,
        );
        let line = format_record(&MemoryRecord::new(&goal, &result.trajectory, &result));
        assert!(line.contains("incomplete"));
        assert!(line.contains("free disk space?"));
        assert!(line.ends_with("about 20 GB"));
    }
}
