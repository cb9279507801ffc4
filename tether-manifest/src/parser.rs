//! Manifest parser
//!
//! This module provides the single validating parse step for manifests.
//! The JSON is deserialized into typed structures and then checked, so the
//! compiler never needs to look at raw JSON.

use std::collections::HashSet;

use tether_core::domain::manifest::{Manifest, Module};

use crate::compiler::IDENTITY_KEYS;
use crate::error::ManifestError;
use crate::topology::TOPOLOGY_KEYS;

/// Parse and validate a manifest from JSON source
///
/// # Errors
/// Returns an error if:
/// - The JSON is malformed or has the wrong shape
/// - Required fields are missing or empty
/// - The manifest declares no modules
/// - A module has an invalid environment key, port, or mount
///
/// # Example
/// ```
/// use tether_manifest::parse_manifest;
///
/// let manifest = parse_manifest(r#"{
///     "applicationName": "pump-app",
///     "version": "1",
///     "modules": [{ "name": "reader", "image": "registry.local/reader:1.2" }]
/// }"#)?;
/// assert_eq!(manifest.modules.len(), 1);
/// # Ok::<(), tether_manifest::ManifestError>(())
/// ```
pub fn parse_manifest(source: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_json::from_str(source)?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Validate an already deserialized manifest
pub fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    if manifest.application_name.trim().is_empty() {
        return Err(ManifestError::MissingField("applicationName".to_string()));
    }

    if manifest.version.trim().is_empty() {
        return Err(ManifestError::MissingField("version".to_string()));
    }

    if manifest.modules.is_empty() {
        return Err(ManifestError::EmptyPipeline(manifest.id().to_string()));
    }

    let mut names = HashSet::new();
    for (idx, module) in manifest.modules.iter().enumerate() {
        validate_module(idx, module)?;

        if !names.insert(module.name.as_str()) {
            return Err(ManifestError::invalid(
                format!("modules[{}].name", idx),
                format!("duplicate module name '{}'", module.name),
            ));
        }
    }

    Ok(())
}

fn validate_module(idx: usize, module: &Module) -> Result<(), ManifestError> {
    if module.name.trim().is_empty() {
        return Err(ManifestError::MissingField(format!("modules[{}].name", idx)));
    }

    if module.image.trim().is_empty() {
        return Err(ManifestError::MissingField(format!(
            "modules[{}].image",
            idx
        )));
    }

    if let Some(tag) = &module.tag {
        if tag.trim().is_empty() {
            return Err(ManifestError::invalid(
                format!("modules[{}].tag", idx),
                "tag cannot be empty",
            ));
        }
    }

    for key in module.environment.keys() {
        if !is_valid_env_key(key) {
            return Err(ManifestError::invalid(
                format!("modules[{}].environment", idx),
                format!("'{}' is not a valid variable name", key),
            ));
        }

        if IDENTITY_KEYS.contains(&key.as_str()) || TOPOLOGY_KEYS.contains(&key.as_str()) {
            return Err(ManifestError::invalid(
                format!("modules[{}].environment", idx),
                format!("'{}' is reserved", key),
            ));
        }
    }

    for port in &module.ports {
        if port.container_port == 0 {
            return Err(ManifestError::invalid(
                format!("modules[{}].ports", idx),
                "containerPort must be greater than 0",
            ));
        }

        if port.host_port == Some(0) {
            return Err(ManifestError::invalid(
                format!("modules[{}].ports", idx),
                "hostPort must be greater than 0",
            ));
        }

        if port.protocol != "tcp" && port.protocol != "udp" {
            return Err(ManifestError::invalid(
                format!("modules[{}].ports", idx),
                format!("unsupported protocol '{}'", port.protocol),
            ));
        }
    }

    for mount in &module.mounts {
        if mount.source.trim().is_empty() || mount.target.trim().is_empty() {
            return Err(ManifestError::invalid(
                format!("modules[{}].mounts", idx),
                "source and target are required",
            ));
        }

        if !mount.target.starts_with('/') {
            return Err(ManifestError::invalid(
                format!("modules[{}].mounts", idx),
                format!("target '{}' must be an absolute path", mount.target),
            ));
        }
    }

    Ok(())
}

/// Checks a variable name against `[A-Za-z_][A-Za-z0-9_]*`
fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
