//! Podman container runtime
//!
//! Drives the `podman` CLI for everything the orchestrator needs:
//! - Checking podman availability
//! - Image presence, pulls and removal
//! - Labelled networks per manifest
//! - Container creation, start, stop and removal
//! - Label-based container discovery (`podman ps --format json`)
//!
//! Each invocation runs under a deadline so a hung engine cannot stall the
//! command path.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use tether_core::domain::container::{ContainerConfig, ContainerInfo, ContainerState, ImageInfo};
use tether_core::domain::manifest::{ManifestUniqueId, RegistryCredentials};
use tether_core::labels;

use super::{ContainerRuntime, Result, RuntimeError};

/// Checks if podman is installed and available
pub async fn check_podman_available(binary: &str) -> anyhow::Result<()> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is podman installed?", binary))?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Container runtime backed by the podman CLI
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    binary: String,

    /// Deadline for ordinary calls
    call_timeout: Duration,

    /// Deadline for image pulls, which are dominated by download time
    pull_timeout: Duration,
}

impl PodmanRuntime {
    /// Creates a new podman runtime
    ///
    /// # Arguments
    /// * `binary` - Path or name of the podman executable
    /// * `call_timeout` - Deadline for every call except pulls
    /// * `pull_timeout` - Deadline for image pulls
    pub fn new(binary: impl Into<String>, call_timeout: Duration, pull_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            call_timeout,
            pull_timeout,
        }
    }

    /// Runs podman with `args`, bounded by `deadline`
    async fn run(&self, args: &[String], deadline: Duration) -> Result<Output> {
        let command = describe(&self.binary, args);
        debug!("Running {}", command);

        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(deadline, child)
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation: command.clone(),
                after: deadline,
            })?
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", command, stderr.trim());
        }

        Ok(output)
    }

    /// Runs podman and fails unless it exits successfully; returns stdout
    async fn run_checked(&self, args: &[String], deadline: Duration) -> Result<String> {
        let output = self.run(args, deadline).await?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: describe(&self.binary, args),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn list_containers(&self, filters: &[String]) -> Result<Vec<ContainerInfo>> {
        let mut args = args(&["ps", "--all", "--format", "json"]);
        for filter in filters {
            args.push("--filter".to_string());
            args.push(filter.clone());
        }

        let stdout = self.run_checked(&args, self.call_timeout).await?;
        parse_containers(&stdout)
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn image_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .run(&args(&["image", "exists", name]), self.call_timeout)
            .await?;

        // podman exits 1 for a missing image, anything else is a failure
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(RuntimeError::CommandFailed {
                command: format!("{} image exists {}", self.binary, name),
                exit_code: code.unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn pull_image(
        &self,
        credentials: Option<&RegistryCredentials>,
        name: &str,
    ) -> Result<()> {
        info!("Pulling image {}", name);

        let mut args = args(&["pull", "--quiet"]);
        if let Some(creds) = credentials {
            args.push("--creds".to_string());
            args.push(format!("{}:{}", creds.username, creds.password));
        }
        args.push(name.to_string());

        self.run_checked(&args, self.pull_timeout).await?;
        Ok(())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut args = args(&["network", "create"]);
        for (key, value) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(name.to_string());

        let stdout = self.run_checked(&args, self.call_timeout).await?;
        let created = stdout.trim();

        Ok(if created.is_empty() {
            name.to_string()
        } else {
            created.to_string()
        })
    }

    async fn network_prune(&self, id: &ManifestUniqueId) -> Result<()> {
        let mut args = args(&["network", "prune", "--force"]);
        for filter in label_filters(id) {
            args.push("--filter".to_string());
            args.push(filter);
        }

        self.run_checked(&args, self.call_timeout).await?;
        Ok(())
    }

    async fn create_and_start_container(&self, config: &ContainerConfig) -> Result<String> {
        let args = run_args(config);
        let stdout = self.run_checked(&args, self.call_timeout).await?;

        let container_id = stdout.trim().to_string();
        info!(
            "Container {} started with ID: {}",
            config.container_name, container_id
        );
        Ok(container_id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run_checked(&args(&["start", id]), self.call_timeout)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.run_checked(&args(&["stop", id]), self.call_timeout)
            .await?;
        Ok(())
    }

    async fn stop_and_remove_container(&self, id: &str) -> Result<()> {
        // A container that is already stopped makes `stop` a no-op
        self.stop_container(id).await?;
        self.run_checked(&args(&["rm", "--force", id]), self.call_timeout)
            .await?;
        Ok(())
    }

    async fn read_containers_by_label(&self, id: &ManifestUniqueId) -> Result<Vec<ContainerInfo>> {
        self.list_containers(&label_filters(id)).await
    }

    async fn read_all_containers(&self) -> Result<Vec<ContainerInfo>> {
        self.list_containers(&[]).await
    }

    async fn get_images_by_name(&self, names: &[String]) -> Result<Vec<ImageInfo>> {
        let stdout = self
            .run_checked(&args(&["images", "--format", "json"]), self.call_timeout)
            .await?;

        let images = parse_images(&stdout)?;
        Ok(images
            .into_iter()
            .filter(|image| {
                image
                    .names
                    .iter()
                    .any(|n| names.iter().any(|wanted| reference_matches(n, wanted)))
            })
            .collect())
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        self.run_checked(&args(&["rmi", id]), self.call_timeout)
            .await?;
        Ok(())
    }

    async fn container_logs(&self, id: &str, since: Option<DateTime<Utc>>) -> Result<String> {
        let args = logs_args(id, since);
        let output = self.run(&args, self.call_timeout).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: describe(&self.binary, &args),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // podman forwards the container's stderr on its own stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `podman logs` arguments; the watermark keeps full precision so lines
/// from the same second are not sent twice
fn logs_args(id: &str, since: Option<DateTime<Utc>>) -> Vec<String> {
    let mut args = args(&["logs"]);
    if let Some(since) = since {
        args.push("--since".to_string());
        args.push(since.to_rfc3339_opts(SecondsFormat::Nanos, true));
    }
    args.push(id.to_string());
    args
}

/// Printable command line, used in logs and errors
fn describe(binary: &str, args: &[String]) -> String {
    redact_creds_arg(&format!("{} {}", binary, args.join(" ")))
}

/// `podman pull --creds` puts the password on the command line
fn redact_creds_arg(command: &str) -> String {
    let mut redact_next = false;
    command
        .split(' ')
        .map(|part| {
            if redact_next {
                redact_next = false;
                "<redacted>"
            } else {
                redact_next = part == "--creds";
                part
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `--filter` values selecting resources owned by `id`
fn label_filters(id: &ManifestUniqueId) -> Vec<String> {
    vec![
        format!("label={}={}", labels::APPLICATION, id.application_name),
        format!("label={}={}", labels::VERSION, id.version),
    ]
}

/// Builds `podman run` arguments for a wired container config
fn run_args(config: &ContainerConfig) -> Vec<String> {
    let mut args = args(&["run", "--detach", "--name"]);
    args.push(config.container_name.clone());
    args.push("--network".to_string());
    args.push(config.network_name.clone());

    for (key, value) in &config.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    for entry in &config.environment_variables {
        args.push("--env".to_string());
        args.push(entry.clone());
    }

    for port in &config.exposed_ports {
        args.push("--expose".to_string());
        args.push(port.clone());
    }

    for binding in &config.port_bindings {
        args.push("--publish".to_string());
        args.push(format!(
            "{}:{}/{}",
            binding.host_port, binding.container_port, binding.protocol
        ));
    }

    for mount in &config.mount_specs {
        args.push("--volume".to_string());
        if mount.read_only {
            args.push(format!("{}:{}:ro", mount.source, mount.target));
        } else {
            args.push(format!("{}:{}", mount.source, mount.target));
        }
    }

    args.push(config.image_reference());
    args
}

/// Matches a fully qualified local image name against a manifest reference
///
/// `docker.io/library/alpine:3.20` matches `alpine:3.20`.
fn reference_matches(local: &str, wanted: &str) -> bool {
    local == wanted || local.ends_with(&format!("/{}", wanted))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PodmanContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(rename = "ImageID", default)]
    image_id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PodmanImage {
    id: String,
    #[serde(default)]
    names: Option<Vec<String>>,
}

fn parse_containers(stdout: &str) -> Result<Vec<ContainerInfo>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let containers: Vec<PodmanContainer> =
        serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;

    Ok(containers
        .into_iter()
        .map(|c| ContainerInfo {
            id: c.id,
            names: c.names,
            image_id: c.image_id,
            state: ContainerState::parse(&c.state),
            exit_code: c.exit_code,
            labels: c.labels.unwrap_or_default(),
        })
        .collect())
}

fn parse_images(stdout: &str) -> Result<Vec<ImageInfo>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let images: Vec<PodmanImage> =
        serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;

    Ok(images
        .into_iter()
        .map(|i| ImageInfo {
            id: i.id,
            names: i.names.unwrap_or_default(),
        })
        .collect())
}
