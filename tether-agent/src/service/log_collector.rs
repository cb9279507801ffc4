//! Container log collection
//!
//! Reads logs written since each application's watermark. The watermark only
//! moves once the batch has been published, so a failed push is retried on
//! the next round instead of losing lines.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use tether_core::domain::manifest::ManifestUniqueId;
use tether_core::domain::record::{DeploymentStatus, ManifestRecord};
use tether_core::domain::status::{ContainerLog, LogSnapshot};

use crate::repository::ManifestRegistry;
use crate::runtime::ContainerRuntime;

/// Logs gathered in one round, plus the watermarks to commit after publishing
#[derive(Debug, Default)]
pub struct LogBatch {
    pub snapshots: Vec<LogSnapshot>,
    watermarks: Vec<(ManifestUniqueId, DateTime<Utc>)>,
}

impl LogBatch {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

pub struct LogCollector {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn ManifestRegistry>,
}

fn has_logs(record: &ManifestRecord) -> bool {
    !record.in_transition
        && matches!(
            record.status,
            DeploymentStatus::Running | DeploymentStatus::Stopped | DeploymentStatus::Error
        )
}

impl LogCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, registry: Arc<dyn ManifestRegistry>) -> Self {
        Self { runtime, registry }
    }

    pub async fn collect(&self) -> LogBatch {
        let mut batch = LogBatch::default();

        for record in self.registry.get_all().into_iter().filter(has_logs) {
            let read_at = Utc::now();

            let containers = match self.runtime.read_containers_by_label(&record.id).await {
                Ok(containers) => containers,
                Err(e) => {
                    warn!("Failed to list containers of {}: {}", record.id, e);
                    continue;
                }
            };

            let mut container_logs = Vec::new();
            let mut complete = true;
            for container in &containers {
                match self
                    .runtime
                    .container_logs(&container.id, record.last_log_read_timestamp)
                    .await
                {
                    Ok(logs) if logs.is_empty() => {}
                    Ok(logs) => container_logs.push(ContainerLog {
                        name: container.name().to_string(),
                        logs,
                    }),
                    Err(e) => {
                        warn!("Failed to read logs of {}: {}", container.name(), e);
                        complete = false;
                    }
                }
            }

            // Keep the old watermark if any container could not be read
            if complete {
                batch.watermarks.push((record.id.clone(), read_at));
            }

            if !container_logs.is_empty() {
                debug!(
                    "Collected logs of {} container(s) for {}",
                    container_logs.len(),
                    record.id
                );
                batch.snapshots.push(LogSnapshot {
                    application_id: record.id,
                    container_logs,
                });
            }
        }

        batch
    }

    /// Advances the watermarks of a published batch
    pub fn commit(&self, batch: &LogBatch) {
        for (id, at) in &batch.watermarks {
            if let Err(e) = self.registry.set_last_log_read(id, *at) {
                warn!("Failed to advance log watermark of {}: {}", id, e);
            }
        }
    }
}
