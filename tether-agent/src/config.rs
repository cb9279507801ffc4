//! Agent configuration
//!
//! Defines the node identity, control plane connection, loop intervals,
//! registry location and container runtime settings.

use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of this node at the control plane
    pub node_id: String,

    /// Control plane base URL (e.g., "http://localhost:8080")
    pub control_plane_url: String,

    /// How often to poll for lifecycle commands
    pub poll_interval: Duration,

    /// How often to reconcile status
    pub status_interval: Duration,

    /// Maximum time between two status pushes, changed or not
    pub heartbeat_interval: Duration,

    /// How often to collect and send container logs
    pub log_send_interval: Duration,

    /// File holding the known-manifest registry
    pub registry_path: PathBuf,

    /// Deadline for a single runtime call
    pub runtime_timeout: Duration,

    /// Deadline for an image pull
    pub pull_timeout: Duration,

    /// Podman executable
    pub podman_bin: String,
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(node_id: String, control_plane_url: String) -> Self {
        Self {
            node_id,
            control_plane_url,
            poll_interval: Duration::from_secs(5),
            status_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            log_send_interval: Duration::from_secs(30),
            registry_path: PathBuf::from("/var/lib/tether/registry.json"),
            runtime_timeout: Duration::from_secs(60),
            pull_timeout: Duration::from_secs(600),
            podman_bin: "podman".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - NODE_ID (required)
    /// - CONTROL_PLANE_URL (required)
    /// - POLL_INTERVAL (optional, seconds, default: 5)
    /// - STATUS_INTERVAL (optional, seconds, default: 10)
    /// - HEARTBEAT_INTERVAL (optional, seconds, default: 60)
    /// - LOG_SEND_INTERVAL (optional, seconds, default: 30)
    /// - REGISTRY_PATH (optional, default: /var/lib/tether/registry.json)
    /// - RUNTIME_TIMEOUT (optional, seconds, default: 60)
    /// - PULL_TIMEOUT (optional, seconds, default: 600)
    /// - PODMAN_BIN (optional, default: podman)
    pub fn from_env() -> anyhow::Result<Self> {
        let node_id = std::env::var("NODE_ID")
            .map_err(|_| anyhow::anyhow!("NODE_ID environment variable not set"))?;

        let control_plane_url = std::env::var("CONTROL_PLANE_URL")
            .map_err(|_| anyhow::anyhow!("CONTROL_PLANE_URL environment variable not set"))?;

        let defaults = Self::new(node_id, control_plane_url);

        Ok(Self {
            poll_interval: env_secs("POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            status_interval: env_secs("STATUS_INTERVAL").unwrap_or(defaults.status_interval),
            heartbeat_interval: env_secs("HEARTBEAT_INTERVAL")
                .unwrap_or(defaults.heartbeat_interval),
            log_send_interval: env_secs("LOG_SEND_INTERVAL").unwrap_or(defaults.log_send_interval),
            registry_path: std::env::var("REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.registry_path.clone()),
            runtime_timeout: env_secs("RUNTIME_TIMEOUT").unwrap_or(defaults.runtime_timeout),
            pull_timeout: env_secs("PULL_TIMEOUT").unwrap_or(defaults.pull_timeout),
            podman_bin: std::env::var("PODMAN_BIN").unwrap_or_else(|_| defaults.podman_bin.clone()),
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.is_empty() {
            anyhow::bail!("node_id cannot be empty");
        }

        if !self.control_plane_url.starts_with("http://")
            && !self.control_plane_url.starts_with("https://")
        {
            anyhow::bail!("control_plane_url must start with http:// or https://");
        }

        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("status_interval", self.status_interval),
            ("heartbeat_interval", self.heartbeat_interval),
            ("log_send_interval", self.log_send_interval),
            ("runtime_timeout", self.runtime_timeout),
            ("pull_timeout", self.pull_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.heartbeat_interval < self.status_interval {
            anyhow::bail!("heartbeat_interval cannot be shorter than status_interval");
        }

        if self.podman_bin.is_empty() {
            anyhow::bail!("podman_bin cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}
