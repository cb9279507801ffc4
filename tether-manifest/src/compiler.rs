//! Manifest compiler
//!
//! Compiles a validated manifest into one `ContainerConfig` per module.
//! Container and network names are left empty here; they are assigned by
//! `topology::wire_topology` once the network exists.

use std::collections::BTreeMap;

use tether_core::domain::container::{ContainerConfig, PortBinding};
use tether_core::domain::manifest::{Manifest, ManifestUniqueId, Module};
use tether_core::labels;

use crate::error::ManifestError;
use crate::parser::validate;

/// `<application>:<version>` of the owning manifest
pub const MANIFEST_ID: &str = "MANIFEST_ID";
pub const APPLICATION_NAME: &str = "APPLICATION_NAME";
pub const APPLICATION_VERSION: &str = "APPLICATION_VERSION";
pub const MODULE_NAME: &str = "MODULE_NAME";

/// Identity variables injected into every stage, in injection order
pub const IDENTITY_KEYS: [&str; 4] = [MANIFEST_ID, APPLICATION_NAME, APPLICATION_VERSION, MODULE_NAME];

const DEFAULT_TAG: &str = "latest";

/// Output of `compile`
#[derive(Debug, Clone)]
pub struct CompiledManifest {
    pub id: ManifestUniqueId,
    /// One config per module, in stage order
    pub configs: Vec<ContainerConfig>,
    /// Labels identifying every resource created for this manifest
    pub labels: BTreeMap<String, String>,
}

impl CompiledManifest {
    /// Distinct image references, in stage order
    pub fn images(&self) -> Vec<String> {
        let mut images: Vec<String> = Vec::new();
        for config in &self.configs {
            let reference = config.image_reference();
            if !images.contains(&reference) {
                images.push(reference);
            }
        }
        images
    }
}

/// Compile a manifest into container configurations
///
/// Validates the manifest first; an empty pipeline is an error.
///
/// # Example
/// ```
/// use tether_manifest::{compile, parse_manifest};
///
/// let manifest = parse_manifest(r#"{
///     "applicationName": "pump-app",
///     "version": "1",
///     "modules": [{ "name": "reader", "image": "registry.local/reader:1.2" }]
/// }"#)?;
/// let compiled = compile(&manifest)?;
/// assert_eq!(compiled.configs[0].image_tag, "1.2");
/// # Ok::<(), tether_manifest::ManifestError>(())
/// ```
pub fn compile(manifest: &Manifest) -> Result<CompiledManifest, ManifestError> {
    validate(manifest)?;

    let id = manifest.id();
    let labels = labels::for_manifest(&id);

    let configs = manifest
        .modules
        .iter()
        .map(|module| compile_module(&id, module, &labels))
        .collect();

    Ok(CompiledManifest {
        id,
        configs,
        labels,
    })
}

fn compile_module(
    id: &ManifestUniqueId,
    module: &Module,
    labels: &BTreeMap<String, String>,
) -> ContainerConfig {
    let (image_name, image_tag) = resolve_image(module);

    let mut environment_variables = vec![
        format!("{}={}", MANIFEST_ID, id),
        format!("{}={}", APPLICATION_NAME, id.application_name),
        format!("{}={}", APPLICATION_VERSION, id.version),
        format!("{}={}", MODULE_NAME, module.name),
    ];
    // BTreeMap iteration keeps user variables sorted by key
    environment_variables.extend(
        module
            .environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value)),
    );

    let exposed_ports = module
        .ports
        .iter()
        .map(|p| format!("{}/{}", p.container_port, p.protocol))
        .collect();

    let port_bindings = module
        .ports
        .iter()
        .filter_map(|p| {
            p.host_port.map(|host_port| PortBinding {
                container_port: p.container_port,
                host_port,
                protocol: p.protocol.clone(),
            })
        })
        .collect();

    ContainerConfig {
        container_name: String::new(),
        image_name,
        image_tag,
        environment_variables,
        exposed_ports,
        port_bindings,
        mount_specs: module.mounts.clone(),
        network_name: String::new(),
        labels: labels.clone(),
        registry_credentials: module.registry.clone(),
    }
}

/// Splits an image reference into name and tag
///
/// An explicit `tag` wins over a `:tag` suffix on the image. A colon before
/// the last `/` belongs to a registry port, not a tag.
fn resolve_image(module: &Module) -> (String, String) {
    let (name, suffix) = split_tag(module.image.trim());

    let tag = module
        .tag
        .as_deref()
        .map(str::trim)
        .or(suffix)
        .unwrap_or(DEFAULT_TAG);

    (name.to_string(), tag.to_string())
}

fn split_tag(image: &str) -> (&str, Option<&str>) {
    let last_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_slash..].rfind(':') {
        Some(pos) => {
            let colon = last_slash + pos;
            (&image[..colon], Some(&image[colon + 1..]))
        }
        None => (image, None),
    }
}
