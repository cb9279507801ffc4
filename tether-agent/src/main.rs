//! Tether Agent
//!
//! Runs on an edge node and keeps its container pipelines in the state the
//! control plane asks for.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Runtime: Podman CLI adapter with bounded call durations
//! - Repositories: Known-manifest registry (local file), command intake and
//!   status sink (HTTP)
//! - Services: Lifecycle transitions, status reconciliation, log collection
//! - Scheduler: Command polling and status/log reporting loops

mod config;
mod repository;
mod runtime;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repository::{
    CommandRepository, FileManifestRegistry, HttpCommandRepository, HttpStatusSink,
    ManifestRegistry, StatusSink,
};
use crate::runtime::{ContainerRuntime, PodmanRuntime, check_podman_available};
use crate::scheduler::{CommandPoller, LogReporter, StatusReporter};
use crate::service::{LifecycleService, LogCollector, StandardLifecycleService, StatusReconciler};
use tether_client::ControlPlaneClient;
use tether_core::domain::record::DeploymentStatus;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tether Agent");

    let config = load_config()?;
    info!(
        "Loaded configuration: node_id={}, control_plane_url={}",
        config.node_id, config.control_plane_url
    );

    wait_for_runtime(&config.podman_bin).await?;

    let registry = Arc::new(
        FileManifestRegistry::load(&config.registry_path).with_context(|| {
            format!(
                "Failed to load registry from {}",
                config.registry_path.display()
            )
        })?,
    );
    info!(
        "Loaded {} known manifest(s) from {}",
        registry.get_all().len(),
        config.registry_path.display()
    );
    recover_interrupted(registry.as_ref());

    let client = Arc::new(ControlPlaneClient::new(
        config.control_plane_url.clone(),
        config.node_id.clone(),
    ));

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(PodmanRuntime::new(
        config.podman_bin.clone(),
        config.runtime_timeout,
        config.pull_timeout,
    ));
    let registry: Arc<dyn ManifestRegistry> = registry;
    let sink: Arc<dyn StatusSink> = Arc::new(HttpStatusSink::new(Arc::clone(&client)));
    let commands: Arc<dyn CommandRepository> =
        Arc::new(HttpCommandRepository::new(Arc::clone(&client)));

    let lifecycle: Arc<dyn LifecycleService> = Arc::new(StandardLifecycleService::new(
        Arc::clone(&runtime),
        Arc::clone(&registry),
        Arc::clone(&sink),
    ));

    let status_reporter = StatusReporter::new(
        StatusReconciler::new(Arc::clone(&runtime), Arc::clone(&registry)),
        Arc::clone(&sink),
        config.status_interval,
        config.heartbeat_interval,
    );
    let log_reporter = LogReporter::new(
        LogCollector::new(Arc::clone(&runtime), Arc::clone(&registry)),
        Arc::clone(&sink),
        config.log_send_interval,
    );

    let status_handle = tokio::spawn(async move { status_reporter.run().await });
    let log_handle = tokio::spawn(async move { log_reporter.run().await });

    let poller = CommandPoller::new(config.poll_interval, commands, lifecycle);

    info!("Agent initialized successfully");

    let result = tokio::select! {
        result = poller.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
            Ok(())
        }
    };

    status_handle.abort();
    log_handle.abort();

    if let Err(e) = &result {
        error!("Poller error: {:#}", e);
    }
    result
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("{}, using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Waits for podman with exponential backoff
///
/// On boot the agent may come up before the container runtime is usable.
async fn wait_for_runtime(podman_bin: &str) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match check_podman_available(podman_bin).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Container runtime available after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) if attempt >= MAX_RETRIES => {
                error!("Container runtime unavailable after {} attempts", MAX_RETRIES);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Container runtime unavailable (attempt {}/{}): {:#}",
                    attempt, MAX_RETRIES, e
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

/// Marks records left mid-transition by a previous run as `Error`
///
/// Whatever that operation left behind is unknown, so the application needs
/// an explicit Undeploy or Remove before it can be deployed again.
fn recover_interrupted(registry: &dyn ManifestRegistry) {
    for record in registry.get_all().into_iter().filter(|r| r.in_transition) {
        warn!(
            "{} was interrupted while {}; marking as {}",
            record.id,
            record.status,
            DeploymentStatus::Error
        );

        let result = registry
            .upsert(&record.id, DeploymentStatus::Error)
            .and_then(|()| registry.set_in_transition(&record.id, false));
        if let Err(e) = result {
            warn!("Failed to recover {}: {}", record.id, e);
        }
    }
}
