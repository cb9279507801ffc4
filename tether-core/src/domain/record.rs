//! Registry record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::manifest::ManifestUniqueId;

/// Desired status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Undeployed,
    Executing,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undeployed => "Undeployed",
            Self::Executing => "Executing",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Known-manifest registry entry
///
/// One record exists per `ManifestUniqueId`. It is the agent's durable view of
/// what is supposed to be running on this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub id: ManifestUniqueId,
    pub status: DeploymentStatus,
    pub container_count: usize,
    /// True while a lifecycle operation is in flight; suppresses drift detection
    pub in_transition: bool,
    pub last_log_read_timestamp: Option<DateTime<Utc>>,
    /// Image references pulled for this manifest
    #[serde(default)]
    pub images: Vec<String>,
}

impl ManifestRecord {
    pub fn new(id: ManifestUniqueId, status: DeploymentStatus) -> Self {
        Self {
            id,
            status,
            container_count: 0,
            in_transition: false,
            last_log_read_timestamp: None,
            images: Vec::new(),
        }
    }
}
