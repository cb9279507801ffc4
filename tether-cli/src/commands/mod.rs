//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod manifest;
mod registry;

pub use init::InitCommands;
pub use manifest::ManifestCommands;
pub use registry::RegistryCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manifest validation and planning
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },
    /// Inspect the local known-manifest registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },
    /// Generate starter files
    Init {
        #[command(subcommand)]
        command: InitCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Manifest { command } => manifest::handle_manifest_command(command),
        Commands::Registry { command } => registry::handle_registry_command(command, config),
        Commands::Init { command } => init::handle_init_command(command),
    }
}
