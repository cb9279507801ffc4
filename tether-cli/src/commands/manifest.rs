//! Manifest command handlers
//!
//! Offline checks of a manifest file: validation, and a preview of the
//! containers the agent would create for it.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use tether_core::domain::container::ContainerConfig;
use tether_manifest::{Manifest, compile, network_name, parse_manifest, wire_topology};

/// Manifest subcommands
#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Validate a manifest file
    Validate {
        /// Path to manifest JSON file
        file: String,
    },
    /// Show the wired container configurations for a manifest
    Plan {
        /// Path to manifest JSON file
        file: String,

        /// Print the configurations as JSON (registry credentials omitted)
        #[arg(long)]
        json: bool,
    },
}

/// Handle manifest commands
pub fn handle_manifest_command(command: ManifestCommands) -> Result<()> {
    match command {
        ManifestCommands::Validate { file } => validate_manifest(&file),
        ManifestCommands::Plan { file, json } => plan_manifest(&file, json),
    }
}

fn read_manifest(path: &str) -> Result<Manifest> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest file: {}", path))?;

    parse_manifest(&source).with_context(|| format!("Invalid manifest: {}", path))
}

/// Compile and wire a manifest exactly as a deploy would
///
/// # Returns
/// Stage configurations in pipeline order
pub fn plan(manifest: &Manifest) -> Result<Vec<ContainerConfig>> {
    let compiled = compile(manifest).context("Failed to compile manifest")?;
    let network = network_name(&compiled.id);
    Ok(wire_topology(compiled.configs, &network))
}

fn validate_manifest(path: &str) -> Result<()> {
    let manifest = read_manifest(path)?;

    println!("{}", "✓ Manifest is valid".green().bold());
    println!("  ID:      {}", manifest.id().to_string().cyan());
    println!(
        "  Modules: {}",
        manifest
            .modules
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
            .dimmed()
    );

    Ok(())
}

fn plan_manifest(path: &str, json: bool) -> Result<()> {
    let manifest = read_manifest(path)?;
    let mut configs = plan(&manifest)?;

    if json {
        for config in &mut configs {
            config.registry_credentials = None;
        }
        println!("{}", serde_json::to_string_pretty(&configs)?);
        return Ok(());
    }

    let network = configs
        .first()
        .map(|c| c.network_name.clone())
        .unwrap_or_default();

    println!("{}", format!("Plan for {}", manifest.id()).bold());
    println!("  Network: {}", network.cyan());
    println!(
        "  Start order: {}",
        configs
            .iter()
            .rev()
            .map(|c| c.container_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );
    println!();

    for (index, config) in configs.iter().enumerate() {
        print_stage(index, config);
    }

    Ok(())
}

fn print_stage(index: usize, config: &ContainerConfig) {
    println!(
        "  {} Stage {} {}",
        "▸".cyan(),
        index,
        config.container_name.bold()
    );
    println!("    Image: {}", config.image_reference());

    if config.registry_credentials.is_some() {
        println!("    Auth:  {}", "registry credentials".dimmed());
    }

    println!("    Environment:");
    for entry in &config.environment_variables {
        println!("      {}", entry.dimmed());
    }

    if !config.exposed_ports.is_empty() {
        println!("    Exposed: {}", config.exposed_ports.join(", "));
    }

    for binding in &config.port_bindings {
        println!(
            "    Publish: {} → {}/{}",
            binding.host_port, binding.container_port, binding.protocol
        );
    }

    for mount in &config.mount_specs {
        let mode = if mount.read_only { "ro" } else { "rw" };
        println!("    Mount: {} → {} ({})", mount.source, mount.target, mode);
    }

    println!();
}
