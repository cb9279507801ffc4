//! Commands repository
//!
//! Handles communication with the control plane for lifecycle commands:
//! - Fetching pending commands for this node
//! - Acknowledging handled commands

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tether_client::ControlPlaneClient;
use tether_core::dto::command::{CommandAck, LifecycleCommand};

/// Repository trait for lifecycle command intake
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Fetches commands pending for this node, in delivery order
    async fn fetch_pending(&self) -> Result<Vec<LifecycleCommand>>;

    /// Reports the outcome of a handled command
    ///
    /// # Arguments
    /// * `ack` - Command ID, success flag and optional message
    async fn acknowledge(&self, ack: CommandAck) -> Result<()>;
}

/// HTTP implementation of CommandRepository
pub struct HttpCommandRepository {
    client: Arc<ControlPlaneClient>,
}

impl HttpCommandRepository {
    pub fn new(client: Arc<ControlPlaneClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandRepository for HttpCommandRepository {
    async fn fetch_pending(&self) -> Result<Vec<LifecycleCommand>> {
        self.client
            .fetch_commands()
            .await
            .context("Failed to fetch pending commands")
    }

    async fn acknowledge(&self, ack: CommandAck) -> Result<()> {
        self.client
            .acknowledge_command(&ack)
            .await
            .with_context(|| format!("Failed to acknowledge command {}", ack.command_id))
    }
}
