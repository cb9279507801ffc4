//! Command intake endpoints

use crate::ControlPlaneClient;
use crate::error::Result;
use tether_core::dto::command::{CommandAck, LifecycleCommand};
use tracing::debug;

impl ControlPlaneClient {
    /// Fetch lifecycle commands pending for this node
    ///
    /// Delivery is at-least-once: a command is returned again until it has
    /// been acknowledged.
    pub async fn fetch_commands(&self) -> Result<Vec<LifecycleCommand>> {
        let url = self.node_url("commands");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Acknowledge a handled command
    ///
    /// # Arguments
    /// * `ack` - Outcome of handling the command
    pub async fn acknowledge_command(&self, ack: &CommandAck) -> Result<()> {
        let url = self.node_url(&format!("commands/{}/ack", ack.command_id));
        debug!(
            "Acknowledging command {} (success: {})",
            ack.command_id, ack.success
        );
        let response = self.client.post(&url).json(ack).send().await?;

        self.handle_empty_response(response).await
    }
}
