//! Pipeline topology wiring
//!
//! Connects adjacent stages through environment variables: each stage learns
//! the generated container name of its neighbours and an egress URL pointing
//! at the next stage. Wiring needs the network name, so it runs as a second
//! pass over the compiled configs, after the network has been created and
//! before any container is.

use tether_core::domain::container::ContainerConfig;
use tether_core::domain::manifest::ManifestUniqueId;
use tether_core::labels;

pub const PREV_CONTAINER_NAME: &str = "PREV_CONTAINER_NAME";
pub const NEXT_CONTAINER_NAME: &str = "NEXT_CONTAINER_NAME";
pub const EGRESS_URL: &str = "EGRESS_URL";

/// Topology variables, reserved in user environments
pub const TOPOLOGY_KEYS: [&str; 3] = [PREV_CONTAINER_NAME, NEXT_CONTAINER_NAME, EGRESS_URL];

/// Egress value of the final stage
pub const NO_EGRESS: &str = "none";

/// Port used in egress URLs when the next stage exposes none
pub const DEFAULT_INGRESS_PORT: u16 = 8080;

/// Makes a name safe for filesystems and DNS
///
/// Whitespace is stripped; any character outside `[A-Za-z0-9_.-]` becomes `_`.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Name of the dedicated network for a manifest
///
/// Carries the version so two versions of one application can run side by
/// side without sharing a network or container names.
pub fn network_name(id: &ManifestUniqueId) -> String {
    sanitize_name(&format!("{}-{}", id.application_name, id.version))
}

/// Deterministic container name for stage `index`
pub fn container_name(network: &str, image_name: &str, image_tag: &str, index: usize) -> String {
    sanitize_name(&format!(
        "{}-{}-{}-{}",
        network, image_name, image_tag, index
    ))
}

/// Assign names and wire adjacent stages together
///
/// Must run over the full, final list of configs: reordering after wiring
/// breaks the chain.
pub fn wire_topology(mut configs: Vec<ContainerConfig>, network: &str) -> Vec<ContainerConfig> {
    for (idx, config) in configs.iter_mut().enumerate() {
        config.network_name = network.to_string();
        config.container_name =
            container_name(network, &config.image_name, &config.image_tag, idx);
        config
            .labels
            .insert(labels::STAGE.to_string(), idx.to_string());
    }

    for idx in 1..configs.len() {
        let prev_name = configs[idx - 1].container_name.clone();
        let next_name = configs[idx].container_name.clone();
        let egress = egress_url(&configs[idx]);

        let prev = &mut configs[idx - 1];
        prev.environment_variables
            .push(format!("{}={}", NEXT_CONTAINER_NAME, next_name));
        prev.environment_variables
            .push(format!("{}={}", EGRESS_URL, egress));

        configs[idx]
            .environment_variables
            .push(format!("{}={}", PREV_CONTAINER_NAME, prev_name));
    }

    if let Some(last) = configs.last_mut() {
        last.environment_variables
            .push(format!("{}={}", EGRESS_URL, NO_EGRESS));
    }

    configs
}

/// URL at which `target` accepts traffic from its upstream stage
fn egress_url(target: &ContainerConfig) -> String {
    let port = target
        .exposed_ports
        .first()
        .and_then(|p| p.split('/').next())
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_INGRESS_PORT);

    format!("http://{}:{}", target.container_name, port)
}
