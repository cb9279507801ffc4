//! Container runtime adapter
//!
//! The agent never runs containers itself. Everything it needs from the
//! container engine goes through the `ContainerRuntime` trait:
//! - Image presence checks, pulls and removal
//! - Per-manifest networks
//! - Container creation, start, stop and removal
//! - Label-based container discovery and log reads

mod podman;

#[cfg(test)]
pub mod fake;

pub use podman::{PodmanRuntime, check_podman_available};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use tether_core::domain::container::{ContainerConfig, ContainerInfo, ImageInfo};
use tether_core::domain::manifest::{ManifestUniqueId, RegistryCredentials};

/// Errors returned by runtime calls
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be executed
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime ran but reported failure
    #[error("'{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The call did not finish within its deadline
    #[error("'{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Runtime output could not be understood
    #[error("Failed to parse runtime output: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Operations the orchestrator needs from the container engine
///
/// Every call may block on the engine; implementations bound each call with
/// a timeout and report it as `RuntimeError::Timeout`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks whether an image reference is present locally
    async fn image_exists(&self, name: &str) -> Result<bool>;

    /// Pulls an image, authenticating when credentials are given
    async fn pull_image(&self, credentials: Option<&RegistryCredentials>, name: &str)
    -> Result<()>;

    /// Creates a labelled network and returns its name
    async fn create_network(&self, name: &str, labels: &BTreeMap<String, String>)
    -> Result<String>;

    /// Removes the unused networks labelled with `id`
    async fn network_prune(&self, id: &ManifestUniqueId) -> Result<()>;

    /// Creates and starts a container, returning its ID
    async fn create_and_start_container(&self, config: &ContainerConfig) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Stops a container and force-removes it
    async fn stop_and_remove_container(&self, id: &str) -> Result<()>;

    /// Lists all containers, in any state, labelled with `id`
    async fn read_containers_by_label(&self, id: &ManifestUniqueId) -> Result<Vec<ContainerInfo>>;

    /// Lists every container on the host, in any state
    async fn read_all_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Returns the local images matching any of the given references
    async fn get_images_by_name(&self, names: &[String]) -> Result<Vec<ImageInfo>>;

    async fn remove_image(&self, id: &str) -> Result<()>;

    /// Reads container output, optionally only what was written after `since`
    async fn container_logs(&self, id: &str, since: Option<DateTime<Utc>>) -> Result<String>;
}
