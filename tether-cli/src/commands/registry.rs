//! Registry command handlers
//!
//! Read-only views of the known-manifest registry file kept by the agent.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::path::Path;
use tether_core::domain::record::{DeploymentStatus, ManifestRecord};

use crate::config::Config;

/// Registry subcommands
#[derive(Subcommand)]
pub enum RegistryCommands {
    /// List every manifest known to the local agent
    List,
}

/// Handle registry commands
pub fn handle_registry_command(command: RegistryCommands, config: &Config) -> Result<()> {
    match command {
        RegistryCommands::List => list_records(&config.registry_path),
    }
}

/// Reads the registry file; a missing file is an empty registry
fn read_records(path: &Path) -> Result<Vec<ManifestRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry: {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Registry file is corrupt: {}", path.display()))
}

fn list_records(path: &Path) -> Result<()> {
    let records = read_records(path)?;

    if records.is_empty() {
        println!("{}", "No manifests recorded.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} manifest(s):", records.len()).bold()
    );
    println!();
    for record in &records {
        print_record_summary(record);
    }

    Ok(())
}

fn print_record_summary(record: &ManifestRecord) {
    println!("  {} {}", "▸".cyan(), record.id.to_string().bold());

    let transition = if record.in_transition {
        " (in transition)".yellow().to_string()
    } else {
        String::new()
    };
    println!("    Status:     {}{}", colorize_status(record.status), transition);
    println!("    Containers: {}", record.container_count);

    if !record.images.is_empty() {
        println!("    Images:     {}", record.images.join(", ").dimmed());
    }

    if let Some(at) = record.last_log_read_timestamp {
        println!(
            "    Logs read:  {}",
            at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}

/// Colorize deployment status for display
fn colorize_status(status: DeploymentStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        DeploymentStatus::Running => status_str.green(),
        DeploymentStatus::Stopped => status_str.yellow(),
        DeploymentStatus::Error => status_str.red(),
        DeploymentStatus::Executing => status_str.cyan(),
        DeploymentStatus::Undeployed => status_str.dimmed(),
    }
}
