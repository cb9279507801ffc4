//! Status sink
//!
//! Publishes status and log snapshots off-node.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tether_client::ControlPlaneClient;
use tether_core::domain::manifest::ManifestUniqueId;
use tether_core::domain::status::{ApplicationStatus, LogSnapshot};

/// Destination for status and log snapshots
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Publishes the reconciled status of every application
    async fn publish_status(&self, statuses: &[ApplicationStatus]) -> Result<()>;

    /// Publishes container logs collected since the previous snapshot
    async fn publish_logs(&self, snapshots: &[LogSnapshot]) -> Result<()>;

    /// Reports that an application has been fully removed
    async fn notify_removed(&self, id: &ManifestUniqueId) -> Result<()>;
}

/// HTTP implementation of StatusSink
pub struct HttpStatusSink {
    client: Arc<ControlPlaneClient>,
}

impl HttpStatusSink {
    pub fn new(client: Arc<ControlPlaneClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn publish_status(&self, statuses: &[ApplicationStatus]) -> Result<()> {
        self.client
            .send_status(statuses)
            .await
            .context("Failed to publish status")
    }

    async fn publish_logs(&self, snapshots: &[LogSnapshot]) -> Result<()> {
        self.client
            .send_logs(snapshots)
            .await
            .context("Failed to publish logs")
    }

    async fn notify_removed(&self, id: &ManifestUniqueId) -> Result<()> {
        self.client
            .notify_removed(id)
            .await
            .with_context(|| format!("Failed to report removal of {}", id))
    }
}

/// Sink that keeps everything it is given, for tests
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub statuses: std::sync::Mutex<Vec<Vec<ApplicationStatus>>>,
    pub logs: std::sync::Mutex<Vec<Vec<LogSnapshot>>>,
    pub removed: std::sync::Mutex<Vec<ManifestUniqueId>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingSink {
    fn check(&self) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("sink unavailable");
        }
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish_status(&self, statuses: &[ApplicationStatus]) -> Result<()> {
        self.check()?;
        self.statuses.lock().unwrap().push(statuses.to_vec());
        Ok(())
    }

    async fn publish_logs(&self, snapshots: &[LogSnapshot]) -> Result<()> {
        self.check()?;
        self.logs.lock().unwrap().push(snapshots.to_vec());
        Ok(())
    }

    async fn notify_removed(&self, id: &ManifestUniqueId) -> Result<()> {
        self.check()?;
        self.removed.lock().unwrap().push(id.clone());
        Ok(())
    }
}
