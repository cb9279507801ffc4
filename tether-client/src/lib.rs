//! Tether Control Plane Client
//!
//! A type-safe HTTP client the edge agent uses to talk to its control plane.
//!
//! # Example
//!
//! ```no_run
//! use tether_client::ControlPlaneClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tether_client::ClientError> {
//!     let client = ControlPlaneClient::new("http://localhost:8080", "edge-node-01");
//!
//!     for command in client.fetch_commands().await? {
//!         println!("{} {}", command.id, command.action.name());
//!     }
//!     Ok(())
//! }
//! ```

mod commands;
pub mod error;
mod status;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use tether_core::dto::command::{CommandAck, LifecycleCommand};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the control plane API
///
/// All endpoints are scoped to the node this agent runs on:
/// - Command intake (fetch pending, acknowledge)
/// - Status and log snapshot publication
/// - Removal notifications
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// Base URL of the control plane (e.g., "http://localhost:8080")
    base_url: String,
    /// Identity of this node
    node_id: String,
    /// HTTP client instance
    client: Client,
}

impl ControlPlaneClient {
    /// Create a new control plane client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the control plane API
    /// * `node_id` - Identifier of the node this agent manages
    ///
    /// # Example
    /// ```
    /// use tether_client::ControlPlaneClient;
    ///
    /// let client = ControlPlaneClient::new("http://localhost:8080", "edge-node-01");
    /// ```
    pub fn new(base_url: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::with_client(base_url, node_id, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        node_id: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            node_id: node_id.into(),
            client,
        }
    }

    /// Get the base URL of the control plane
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the node identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Build a node-scoped endpoint URL
    fn node_url(&self, path: &str) -> String {
        format!("{}/api/nodes/{}/{}", self.base_url, self.node_id, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
