//! Lifecycle command DTOs
//!
//! Commands arrive from the control plane with at-least-once delivery. Every
//! command carries an ID so the agent can acknowledge it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::manifest::{Manifest, ManifestUniqueId};

/// Command issued to this node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleCommand {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: CommandAction,
}

/// Requested lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CommandAction {
    Deploy { manifest: Manifest },
    Stop { application: ManifestUniqueId },
    Resume { application: ManifestUniqueId },
    Undeploy { application: ManifestUniqueId },
    Remove { application: ManifestUniqueId },
}

impl CommandAction {
    /// Identity of the application this action targets
    pub fn application(&self) -> ManifestUniqueId {
        match self {
            Self::Deploy { manifest } => manifest.id(),
            Self::Stop { application }
            | Self::Resume { application }
            | Self::Undeploy { application }
            | Self::Remove { application } => application.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy { .. } => "deploy",
            Self::Stop { .. } => "stop",
            Self::Resume { .. } => "resume",
            Self::Undeploy { .. } => "undeploy",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Acknowledgement sent after a command has been handled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub command_id: Uuid,
    pub success: bool,
    pub message: Option<String>,
}
