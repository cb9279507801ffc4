//! Init command handlers
//!
//! Generates a starter manifest to edit.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::fs;
use std::path::Path;

/// Init subcommands
#[derive(Subcommand)]
pub enum InitCommands {
    /// Write an example three-stage manifest
    Manifest {
        /// Output file
        #[arg(short, long, default_value = "manifest.json")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Handle init commands
pub fn handle_init_command(command: InitCommands) -> Result<()> {
    match command {
        InitCommands::Manifest { output, force } => write_example_manifest(Path::new(&output), force),
    }
}

const EXAMPLE_MANIFEST: &str = r#"{
  "applicationName": "pump-monitor",
  "version": "1",
  "modules": [
    {
      "name": "reader",
      "image": "registry.local/edge/modbus-reader:1.0",
      "environment": { "POLL_MS": "500" },
      "mounts": [{ "source": "/dev/ttyUSB0", "target": "/dev/ttyUSB0" }]
    },
    {
      "name": "filter",
      "image": "registry.local/edge/threshold-filter",
      "tag": "2.1",
      "ports": [{ "containerPort": 8080 }]
    },
    {
      "name": "uplink",
      "image": "registry.local/edge/mqtt-uplink:0.4",
      "ports": [{ "containerPort": 8080, "hostPort": 18080 }]
    }
  ]
}
"#;

fn write_example_manifest(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    fs::write(path, EXAMPLE_MANIFEST)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;

    println!("  {} {}", "Created".green(), path.display());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Replace the images with your own modules");
    println!(
        "  2. Use {} to preview the containers",
        format!("tether manifest plan {}", path.display()).cyan()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_manifest_is_valid() {
        let manifest = tether_manifest::parse_manifest(EXAMPLE_MANIFEST).unwrap();
        assert_eq!(manifest.modules.len(), 3);
        assert!(tether_manifest::compile(&manifest).is_ok());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{}").unwrap();

        assert!(write_example_manifest(&path, false).is_err());
        assert!(write_example_manifest(&path, true).is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap(), EXAMPLE_MANIFEST);
    }
}
