//! Tether Core
//!
//! Core types and abstractions for the Tether edge agent.
//!
//! This crate contains:
//! - Domain types: Core entities (Manifest, ManifestRecord, ContainerConfig, etc.)
//! - DTOs: Data transfer objects exchanged with the control plane
//! - Labels: Keys used to tag runtime resources with their owning manifest

pub mod domain;
pub mod dto;
pub mod labels;
