//! Status reconciler
//!
//! Compares the registry's desired status with what the runtime reports and
//! produces the per-application snapshot sent off-node. Drift is written back
//! to the registry as `Error`.

use std::sync::Arc;
use tracing::{debug, warn};

use tether_core::domain::container::ContainerInfo;
use tether_core::domain::record::{DeploymentStatus, ManifestRecord};
use tether_core::domain::status::{ApplicationStatus, ContainerStatus};

use crate::repository::ManifestRegistry;
use crate::runtime::ContainerRuntime;

pub struct StatusReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn ManifestRegistry>,
}

impl StatusReconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, registry: Arc<dyn ManifestRegistry>) -> Self {
        Self { runtime, registry }
    }

    /// Reconciled status of every record not currently in transition, in
    /// registry order
    pub async fn reconcile(&self) -> Vec<ApplicationStatus> {
        let mut statuses = Vec::new();

        for record in self.registry.get_all() {
            if record.in_transition {
                debug!("Skipping {} while in transition", record.id);
                continue;
            }

            let containers = match self.runtime.read_containers_by_label(&record.id).await {
                Ok(containers) => containers,
                Err(e) => {
                    warn!("Failed to read containers of {}: {}", record.id, e);
                    statuses.push(ApplicationStatus {
                        application_id: record.id,
                        status: DeploymentStatus::Error,
                        containers: Vec::new(),
                    });
                    continue;
                }
            };

            let status = evaluate(&record, &containers);
            if status == DeploymentStatus::Error && record.status != DeploymentStatus::Error {
                self.correct(&record);
            }

            statuses.push(ApplicationStatus {
                application_id: record.id,
                status,
                containers: containers
                    .iter()
                    .map(|c| ContainerStatus {
                        name: c.name().to_string(),
                        status: c.state.as_str().to_string(),
                    })
                    .collect(),
            });
        }

        statuses
    }

    fn correct(&self, record: &ManifestRecord) {
        match self
            .registry
            .replace_status_if_idle(&record.id, record.status, DeploymentStatus::Error)
        {
            Ok(true) => warn!(
                "Drift detected for {}: {} -> {}",
                record.id,
                record.status,
                DeploymentStatus::Error
            ),
            // A lifecycle operation started in the meantime; it owns the status now
            Ok(false) => debug!("Not correcting {}, record changed", record.id),
            Err(e) => warn!("Failed to record drift for {}: {}", record.id, e),
        }
    }
}

/// Effective status of `record` given its live containers
pub fn evaluate(record: &ManifestRecord, containers: &[ContainerInfo]) -> DeploymentStatus {
    if containers.len() != record.container_count {
        return DeploymentStatus::Error;
    }

    match record.status {
        DeploymentStatus::Running if !containers.iter().all(ContainerInfo::is_running) => {
            DeploymentStatus::Error
        }
        DeploymentStatus::Stopped if !containers.iter().all(ContainerInfo::exited_cleanly) => {
            DeploymentStatus::Error
        }
        status => status,
    }
}

/// Whether `curr` differs from `prev` enough to be worth sending
///
/// Compares application count, then identity and status pairwise in order.
/// Per-container states are not compared.
pub fn has_changed(prev: &[ApplicationStatus], curr: &[ApplicationStatus]) -> bool {
    prev.len() != curr.len()
        || prev
            .iter()
            .zip(curr)
            .any(|(p, c)| p.application_id != c.application_id || p.status != c.status)
}
