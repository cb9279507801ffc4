//! Core domain types
//!
//! This module contains the domain structures shared across Tether crates.
//! These types describe what should run on the node (manifests and registry
//! records) and what the container runtime reports back (containers, images).

pub mod container;
pub mod manifest;
pub mod record;
pub mod status;
