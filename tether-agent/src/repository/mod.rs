//! Repository layer
//!
//! Repositories abstract the agent's data sources and sinks without any
//! business logic:
//! - The known-manifest registry (local JSON file)
//! - Lifecycle commands from the control plane
//! - Status and log publication to the control plane
//!
//! All repositories are trait-based to enable testing and mocking.

mod commands;
mod manifests;
mod status;

// Re-export traits
pub use commands::CommandRepository;
pub use manifests::{ManifestRegistry, RegistryError};
pub use status::StatusSink;

// Re-export implementations
pub use commands::HttpCommandRepository;
pub use manifests::FileManifestRegistry;
pub use status::HttpStatusSink;

#[cfg(test)]
pub use status::RecordingSink;
