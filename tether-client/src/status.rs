//! Status and log publication endpoints

use crate::ControlPlaneClient;
use crate::error::Result;
use tether_core::domain::manifest::ManifestUniqueId;
use tether_core::domain::status::{ApplicationStatus, LogSnapshot};

impl ControlPlaneClient {
    /// Publish the reconciled status of every application on this node
    ///
    /// Also serves as the node heartbeat.
    pub async fn send_status(&self, statuses: &[ApplicationStatus]) -> Result<()> {
        let url = self.node_url("status");
        let response = self.client.post(&url).json(statuses).send().await?;

        self.handle_empty_response(response).await
    }

    /// Publish container logs collected since the previous snapshot
    pub async fn send_logs(&self, snapshots: &[LogSnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let url = self.node_url("logs");
        let response = self.client.post(&url).json(snapshots).send().await?;

        self.handle_empty_response(response).await
    }

    /// Tell the control plane an application has been fully removed
    pub async fn notify_removed(&self, id: &ManifestUniqueId) -> Result<()> {
        let url = self.node_url(&format!(
            "applications/{}/{}",
            id.application_name, id.version
        ));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
