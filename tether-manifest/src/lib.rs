//! Tether Manifest Compiler
//!
//! This crate turns a pipeline manifest into container configurations.
//! It includes:
//! - Validating parse of the JSON manifest into typed structures
//! - Compilation of each module into a `ContainerConfig`
//! - Pipeline topology wiring between adjacent stages
//!
//! Nothing in this crate touches the container runtime.

pub mod compiler;
pub mod error;
pub mod parser;
pub mod topology;

pub use compiler::{CompiledManifest, compile};
pub use error::ManifestError;
pub use parser::{parse_manifest, validate};
pub use topology::{container_name, network_name, sanitize_name, wire_topology};

pub use tether_core::domain::manifest::{Manifest, ManifestUniqueId, Module};
