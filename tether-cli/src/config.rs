//! Configuration module
//!
//! Handles CLI configuration shared by all commands.

use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry file written by the agent on this node
    pub registry_path: PathBuf,
}
