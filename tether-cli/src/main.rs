//! Tether CLI
//!
//! Command-line tools for authoring manifests and inspecting an edge node.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether edge application CLI", long_about = None)]
struct Cli {
    /// Known-manifest registry file of the local agent
    #[arg(
        long,
        env = "REGISTRY_PATH",
        default_value = "/var/lib/tether/registry.json"
    )]
    registry_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        registry_path: cli.registry_path,
    };

    handle_command(cli.command, &config)
}
