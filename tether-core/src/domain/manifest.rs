//! Manifest domain types
//!
//! A manifest declares a multi-stage container pipeline. It is received from
//! the control plane as JSON and validated by `tether-manifest` before any
//! container is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a deployment: application name plus version
///
/// The natural key for registry records, runtime labels and status reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestUniqueId {
    pub application_name: String,
    pub version: String,
}

impl ManifestUniqueId {
    pub fn new(application_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ManifestUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.application_name, self.version)
    }
}

/// Pipeline manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub application_name: String,
    pub version: String,
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl Manifest {
    /// Returns the unique identity of this manifest
    pub fn id(&self) -> ManifestUniqueId {
        ManifestUniqueId::new(&self.application_name, &self.version)
    }
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,

    /// Image reference, optionally with a `:tag` suffix
    pub image: String,

    /// Explicit tag; takes precedence over a suffix in `image`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub ports: Vec<PortSpec>,

    #[serde(default)]
    pub mounts: Vec<MountSpec>,

    /// Credentials for pulling this module's image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryCredentials>,
}

/// Port exposed by a stage, optionally published on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Bind mount from the host into a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Image registry credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    #[serde(default)]
    pub server: Option<String>,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
