//! Container domain types
//!
//! `ContainerConfig` is what the manifest compiler produces and the runtime
//! adapter consumes. `ContainerInfo` and `ImageInfo` are what the runtime
//! reports back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::manifest::{MountSpec, RegistryCredentials};

/// Fully resolved configuration for one pipeline stage container
///
/// Produced by the manifest compiler, completed by topology wiring, and
/// consumed once by the runtime adapter at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub container_name: String,
    pub image_name: String,
    pub image_tag: String,
    /// Ordered `KEY=value` entries
    pub environment_variables: Vec<String>,
    /// `port/protocol` entries
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<PortBinding>,
    pub mount_specs: Vec<MountSpec>,
    pub network_name: String,
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_credentials: Option<RegistryCredentials>,
}

impl ContainerConfig {
    /// Image reference in `name:tag` form
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    /// Returns the value of the last `KEY=value` entry for `key`
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.environment_variables.iter().rev().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Host port publication for a container port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
}

/// Lifecycle state reported by the container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Stopping,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    /// Parses a runtime state string, case-insensitively
    pub fn parse(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" | "configured" | "initialized" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "stopping" | "removing" => Self::Stopping,
            "exited" | "stopped" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

/// A container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub names: Vec<String>,
    pub image_id: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ContainerInfo {
    /// Primary container name, falling back to the ID
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.id)
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    /// Exited with status 0, i.e. cleanly stopped
    pub fn exited_cleanly(&self) -> bool {
        self.state == ContainerState::Exited && self.exit_code == Some(0)
    }
}

/// A local image as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub id: String,
    pub names: Vec<String>,
}
