//! In-memory container runtime for tests
//!
//! Records every mutating call in order and keeps just enough state
//! (images, networks, containers) to answer queries consistently.
//! Failures can be injected per image or per container name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use tether_core::domain::container::{ContainerConfig, ContainerInfo, ContainerState, ImageInfo};
use tether_core::domain::manifest::{ManifestUniqueId, RegistryCredentials};
use tether_core::labels;

use super::{ContainerRuntime, Result, RuntimeError};

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PullImage(String),
    CreateNetwork(String),
    NetworkPrune(ManifestUniqueId),
    CreateAndStart(String),
    Start(String),
    Stop(String),
    StopAndRemove(String),
    RemoveImage(String),
}

/// A network known to the fake runtime
#[derive(Debug, Clone)]
pub struct FakeNetwork {
    /// Unique per creation, so a recreated network has a new identity
    pub serial: u64,
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    local_images: HashSet<String>,
    networks: Vec<FakeNetwork>,
    containers: Vec<ContainerInfo>,
    created_configs: Vec<ContainerConfig>,
    logs: HashMap<String, String>,
    serial: u64,
    failing_pulls: HashSet<String>,
    failing_creates: HashSet<String>,
    failing_stops: HashSet<String>,
    failing_removes: HashSet<String>,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

fn image_id(reference: &str) -> String {
    format!("sha-{}", reference)
}

fn owned_by(labels: &BTreeMap<String, String>, id: &ManifestUniqueId) -> bool {
    labels.get(labels::APPLICATION) == Some(&id.application_name)
        && labels.get(labels::VERSION) == Some(&id.version)
}

fn failure(command: &str, target: &str) -> RuntimeError {
    RuntimeError::CommandFailed {
        command: format!("{} {}", command, target),
        exit_code: 125,
        stderr: "injected failure".to_string(),
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_local_image(self, reference: &str) -> Self {
        self.state().local_images.insert(reference.to_string());
        self
    }

    pub fn fail_pull(&self, reference: &str) {
        self.state().failing_pulls.insert(reference.to_string());
    }

    /// Fails creation of any container whose name contains `fragment`
    pub fn fail_create(&self, fragment: &str) {
        self.state().failing_creates.insert(fragment.to_string());
    }

    pub fn fail_stop(&self, fragment: &str) {
        self.state().failing_stops.insert(fragment.to_string());
    }

    pub fn fail_remove(&self, fragment: &str) {
        self.state().failing_removes.insert(fragment.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn networks(&self) -> Vec<FakeNetwork> {
        self.state().networks.clone()
    }

    pub fn containers(&self) -> Vec<ContainerInfo> {
        self.state().containers.clone()
    }

    pub fn created_configs(&self) -> Vec<ContainerConfig> {
        self.state().created_configs.clone()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state().local_images.contains(reference)
    }

    /// Changes a container's state behind the agent's back
    pub fn set_container_state(&self, fragment: &str, state: ContainerState, exit_code: Option<i64>) {
        for container in self.state().containers.iter_mut() {
            if container.name().contains(fragment) {
                container.state = state;
                container.exit_code = exit_code;
            }
        }
    }

    /// Deletes a container behind the agent's back
    pub fn remove_out_of_band(&self, fragment: &str) {
        self.state()
            .containers
            .retain(|c| !c.name().contains(fragment));
    }

    /// Adds an unrelated container using `reference`
    pub fn add_foreign_container(&self, name: &str, reference: &str) {
        let mut state = self.state();
        state.serial += 1;
        let serial = state.serial;
        state.containers.push(ContainerInfo {
            id: format!("c{}", serial),
            names: vec![name.to_string()],
            image_id: image_id(reference),
            state: ContainerState::Running,
            exit_code: None,
            labels: BTreeMap::new(),
        });
    }

    pub fn set_logs(&self, container_id: &str, logs: &str) {
        self.state()
            .logs
            .insert(container_id.to_string(), logs.to_string());
    }

    fn find_name(state: &State, id: &str) -> String {
        state
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().local_images.contains(name))
    }

    async fn pull_image(
        &self,
        _credentials: Option<&RegistryCredentials>,
        name: &str,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::PullImage(name.to_string()));
        if state.failing_pulls.contains(name) {
            return Err(failure("pull", name));
        }
        state.local_images.insert(name.to_string());
        Ok(())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut state = self.state();
        state.calls.push(Call::CreateNetwork(name.to_string()));
        if state.networks.iter().any(|n| n.name == name) {
            return Err(failure("network create", name));
        }
        state.serial += 1;
        let serial = state.serial;
        state.networks.push(FakeNetwork {
            serial,
            name: name.to_string(),
            labels: labels.clone(),
        });
        Ok(name.to_string())
    }

    async fn network_prune(&self, id: &ManifestUniqueId) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::NetworkPrune(id.clone()));
        state.networks.retain(|n| !owned_by(&n.labels, id));
        Ok(())
    }

    async fn create_and_start_container(&self, config: &ContainerConfig) -> Result<String> {
        let mut state = self.state();
        let name = config.container_name.clone();
        state.calls.push(Call::CreateAndStart(name.clone()));
        if state.failing_creates.iter().any(|f| name.contains(f.as_str())) {
            return Err(failure("run", &name));
        }
        if state.containers.iter().any(|c| c.names.contains(&name)) {
            return Err(failure("run", &name));
        }
        state.serial += 1;
        let id = format!("c{}", state.serial);
        state.containers.push(ContainerInfo {
            id: id.clone(),
            names: vec![name],
            image_id: image_id(&config.image_reference()),
            state: ContainerState::Running,
            exit_code: None,
            labels: config.labels.clone(),
        });
        state.created_configs.push(config.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = Self::find_name(&state, id);
        state.calls.push(Call::Start(name));
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.state = ContainerState::Running;
                container.exit_code = None;
                Ok(())
            }
            None => Err(failure("start", id)),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = Self::find_name(&state, id);
        state.calls.push(Call::Stop(name.clone()));
        if state.failing_stops.iter().any(|f| name.contains(f.as_str())) {
            return Err(failure("stop", &name));
        }
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.state = ContainerState::Exited;
                container.exit_code = Some(0);
                Ok(())
            }
            None => Err(failure("stop", id)),
        }
    }

    async fn stop_and_remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = Self::find_name(&state, id);
        state.calls.push(Call::StopAndRemove(name.clone()));
        if state.failing_removes.iter().any(|f| name.contains(f.as_str())) {
            return Err(failure("rm", &name));
        }
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn read_containers_by_label(&self, id: &ManifestUniqueId) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|c| owned_by(&c.labels, id))
            .cloned()
            .collect())
    }

    async fn read_all_containers(&self) -> Result<Vec<ContainerInfo>> {
        Ok(self.state().containers.clone())
    }

    async fn get_images_by_name(&self, names: &[String]) -> Result<Vec<ImageInfo>> {
        let state = self.state();
        Ok(names
            .iter()
            .filter(|n| state.local_images.contains(n.as_str()))
            .map(|n| ImageInfo {
                id: image_id(n),
                names: vec![n.clone()],
            })
            .collect())
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::RemoveImage(id.to_string()));
        state.local_images.retain(|reference| image_id(reference) != id);
        Ok(())
    }

    async fn container_logs(&self, id: &str, _since: Option<DateTime<Utc>>) -> Result<String> {
        Ok(self.state().logs.get(id).cloned().unwrap_or_default())
    }
}
