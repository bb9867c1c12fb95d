//! `aihelper onboard`: create the default config and data directories.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use aihelper_core::config::{get_config_path, save_config, Config};
use aihelper_core::utils::{get_default_workspace_path, get_memory_path};

use crate::helpers::display_path;

pub fn run() -> Result<()> {
    println!();
    println!("{}", "AI Helper Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    if ensure_config(&config_path)? {
        println!("  {} created config at {}", "✓".green(), display_path(&config_path));
    } else {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            display_path(&config_path)
        );
    }

    for (label, dir) in [
        ("workspace", get_default_workspace_path()),
        ("memory", get_memory_path()),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {label} dir {}", dir.display()))?;
        println!("  {} {label} at {}", "✓".green(), display_path(&dir));
    }

    println!();
    println!(
        "{}",
        "  Setup complete! Run `aihelper agent` to start.".green()
    );
    println!();
    Ok(())
}

/// Write a default config to `path` unless one exists. Returns whether it wrote.
fn ensure_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}
