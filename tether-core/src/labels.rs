//! Resource label keys
//!
//! Every network and container created for a manifest carries these labels so
//! it can be found again by `ManifestUniqueId` after an agent restart.

use std::collections::BTreeMap;

use crate::domain::manifest::ManifestUniqueId;

/// Marks a resource as created by Tether
pub const MANAGED: &str = "tether.managed";

/// Application name of the owning manifest
pub const APPLICATION: &str = "tether.application";

/// Version identifier of the owning manifest
pub const VERSION: &str = "tether.version";

/// Pipeline stage index of a container
pub const STAGE: &str = "tether.stage";

/// Builds the label set identifying resources owned by `id`
pub fn for_manifest(id: &ManifestUniqueId) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED.to_string(), "true".to_string());
    labels.insert(APPLICATION.to_string(), id.application_name.clone());
    labels.insert(VERSION.to_string(), id.version.clone());
    labels
}

/// Reads the stage index label, if present and well formed
pub fn stage_index(labels: &BTreeMap<String, String>) -> Option<usize> {
    labels.get(STAGE).and_then(|s| s.parse().ok())
}
