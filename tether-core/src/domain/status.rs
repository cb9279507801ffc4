//! Status and log snapshot types sent to the control plane

use serde::{Deserialize, Serialize};

use super::manifest::ManifestUniqueId;
use super::record::DeploymentStatus;

/// Reconciled status of one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    pub application_id: ManifestUniqueId,
    pub status: DeploymentStatus,
    pub containers: Vec<ContainerStatus>,
}

/// Name and runtime state of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub status: String,
}

/// Logs collected for one application since the previous snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    pub application_id: ManifestUniqueId,
    pub container_logs: Vec<ContainerLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLog {
    pub name: String,
    pub logs: String,
}
