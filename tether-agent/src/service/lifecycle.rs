//! Lifecycle service
//!
//! Drives the per-application state machine:
//!
//! ```text
//! Undeployed --deploy---> Executing --> Running | Error
//! Running    --stop-----> Executing --> Stopped | Error
//! Stopped    --resume---> Executing --> Running | Error
//! any        --undeploy-> Executing --> Undeployed | Error
//! any        --remove---> (record deleted) | Error
//! ```
//!
//! Each operation is a multi-step procedure over the manifest compiler, the
//! registry and the container runtime. Commands for one application are
//! serialised; a deploy that fails part way is rolled back.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use tether_core::domain::manifest::{Manifest, ManifestUniqueId};
use tether_core::domain::record::DeploymentStatus;
use tether_core::labels;
use tether_manifest::{CompiledManifest, ManifestError, compile, network_name, wire_topology};

use crate::repository::{ManifestRegistry, RegistryError, StatusSink};
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Result of a lifecycle operation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The transition ran
    Applied,
    /// A precondition did not hold; nothing was changed
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDeployed(DeploymentStatus),
    NotFound,
    WrongStatus {
        expected: DeploymentStatus,
        actual: DeploymentStatus,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDeployed(status) => write!(f, "already deployed (status: {})", status),
            Self::NotFound => write!(f, "no record for this manifest"),
            Self::WrongStatus { expected, actual } => {
                write!(f, "expected status {}, found {}", expected, actual)
            }
        }
    }
}

/// Failures of a lifecycle operation
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid manifest: {0}")]
    Validation(#[from] ManifestError),

    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to create {resource}: {source}")]
    ResourceCreation {
        resource: String,
        #[source]
        source: RuntimeError,
    },

    #[error("No containers for manifest {0}")]
    NoContainers(ManifestUniqueId),

    #[error("Cleanup incomplete: {}", .0.join("; "))]
    PartialCleanup(Vec<String>),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Service trait for application lifecycle transitions
#[async_trait]
pub trait LifecycleService: Send + Sync {
    /// Deploys a manifest; a no-op if it is already deployed
    async fn deploy(&self, manifest: &Manifest) -> Result<Outcome, LifecycleError>;

    /// Stops every running container of a `Running` application
    async fn stop(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError>;

    /// Restarts the containers of a `Stopped` application
    async fn resume(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError>;

    /// Removes containers and network, keeping the record as `Undeployed`
    async fn undeploy(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError>;

    /// Undeploys, deletes orphaned images and forgets the application
    async fn remove(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError>;
}

/// Standard implementation of LifecycleService
pub struct StandardLifecycleService {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn ManifestRegistry>,
    sink: Arc<dyn StatusSink>,

    /// One async mutex per application; serialises commands for the same ID
    locks: Mutex<HashMap<ManifestUniqueId, Arc<tokio::sync::Mutex<()>>>>,
}

impl StandardLifecycleService {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn ManifestRegistry>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            runtime,
            registry,
            sink,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for exclusive access to `id`
    async fn lock(&self, id: &ManifestUniqueId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    fn skip(&self, operation: &str, id: &ManifestUniqueId, reason: SkipReason) -> Outcome {
        warn!("Skipping {} of {}: {}", operation, id, reason);
        Outcome::Skipped(reason)
    }

    /// Marks `id` as executing and suppresses drift detection
    ///
    /// If the registry rejects either write the record is finished as `Error`.
    fn begin(&self, id: &ManifestUniqueId) -> Result<(), LifecycleError> {
        self.registry
            .upsert(id, DeploymentStatus::Executing)
            .and_then(|()| self.registry.set_in_transition(id, true))
            .map_err(|e| self.fail(id, e.into()))
    }

    /// Records the final status and always clears the transition flag
    fn finish(&self, id: &ManifestUniqueId, status: DeploymentStatus) -> Result<(), RegistryError> {
        let status_result = self.registry.upsert(id, status);
        let flag_result = self.registry.set_in_transition(id, false);
        status_result.and(flag_result)
    }

    /// Finishes a failed operation and returns its original error
    fn fail(&self, id: &ManifestUniqueId, err: LifecycleError) -> LifecycleError {
        if let Err(e) = self.finish(id, DeploymentStatus::Error) {
            warn!("Failed to record Error status for {}: {}", id, e);
        }
        err
    }

    /// Records the images, brings the resources up and finishes as `Running`
    ///
    /// # Returns
    /// Number of containers started
    async fn apply_deploy(&self, compiled: &CompiledManifest) -> Result<usize, LifecycleError> {
        let id = &compiled.id;
        self.registry.set_container_count(id, 0)?;
        self.registry.set_images(id, compiled.images())?;

        let count = self.deploy_resources(compiled).await?;

        self.registry.set_container_count(id, count)?;
        self.finish(id, DeploymentStatus::Running)?;
        Ok(count)
    }

    /// Pulls images, creates the network and starts every container
    ///
    /// # Returns
    /// Number of containers started
    async fn deploy_resources(&self, compiled: &CompiledManifest) -> Result<usize, LifecycleError> {
        for image in compiled.images().iter().rev() {
            let present = self
                .runtime
                .image_exists(image)
                .await
                .map_err(|source| LifecycleError::Pull {
                    image: image.clone(),
                    source,
                })?;

            if present {
                debug!("Image {} already present", image);
                continue;
            }

            let credentials = compiled
                .configs
                .iter()
                .filter(|c| &c.image_reference() == image)
                .find_map(|c| c.registry_credentials.as_ref());

            self.runtime
                .pull_image(credentials, image)
                .await
                .map_err(|source| LifecycleError::Pull {
                    image: image.clone(),
                    source,
                })?;
        }

        let requested = network_name(&compiled.id);
        let network = self
            .runtime
            .create_network(&requested, &compiled.labels)
            .await
            .map_err(|source| LifecycleError::ResourceCreation {
                resource: format!("network {}", requested),
                source,
            })?;
        debug!("Created network {} for {}", network, compiled.id);

        let configs = wire_topology(compiled.configs.clone(), &network);

        // Downstream stages first, so every egress target is up before its upstream
        for config in configs.iter().rev() {
            let container_id = self
                .runtime
                .create_and_start_container(config)
                .await
                .map_err(|source| LifecycleError::ResourceCreation {
                    resource: format!("container {}", config.container_name),
                    source,
                })?;
            debug!(
                "Started container {} ({}) for {}",
                config.container_name, container_id, compiled.id
            );
        }

        Ok(configs.len())
    }

    /// Best-effort removal of every container and the network of `id`
    ///
    /// # Returns
    /// One message per failed step; empty on full success
    async fn teardown(&self, id: &ManifestUniqueId) -> Vec<String> {
        let mut errors = Vec::new();

        match self.runtime.read_containers_by_label(id).await {
            Ok(containers) => {
                for container in containers {
                    if let Err(e) = self.runtime.stop_and_remove_container(&container.id).await {
                        warn!("Failed to remove container {}: {}", container.name(), e);
                        errors.push(format!("container {}: {}", container.name(), e));
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list containers of {}: {}", id, e);
                errors.push(format!("list containers: {}", e));
            }
        }

        if let Err(e) = self.runtime.network_prune(id).await {
            warn!("Failed to prune network of {}: {}", id, e);
            errors.push(format!("network: {}", e));
        }

        errors
    }

    /// Deletes images of `images` that no remaining container uses
    async fn remove_orphaned_images(&self, images: &[String]) -> Vec<String> {
        if images.is_empty() {
            return Vec::new();
        }

        let local = match self.runtime.get_images_by_name(images).await {
            Ok(local) => local,
            Err(e) => return vec![format!("list images: {}", e)],
        };

        let in_use: HashSet<String> = match self.runtime.read_all_containers().await {
            Ok(containers) => containers.into_iter().map(|c| c.image_id).collect(),
            Err(e) => return vec![format!("list containers: {}", e)],
        };

        let mut errors = Vec::new();
        for image in local {
            if in_use.contains(&image.id) {
                info!("Retaining image {:?}, still in use", image.names);
                continue;
            }

            match self.runtime.remove_image(&image.id).await {
                Ok(()) => info!("Removed image {:?}", image.names),
                Err(e) => {
                    warn!("Failed to remove image {}: {}", image.id, e);
                    errors.push(format!("image {}: {}", image.id, e));
                }
            }
        }

        errors
    }

    async fn stop_containers(&self, id: &ManifestUniqueId) -> Result<(), LifecycleError> {
        let containers = self.runtime.read_containers_by_label(id).await?;
        if containers.is_empty() {
            return Err(LifecycleError::NoContainers(id.clone()));
        }

        for container in containers.iter().filter(|c| c.is_running()) {
            self.runtime.stop_container(&container.id).await?;
            debug!("Stopped container {}", container.name());
        }

        Ok(())
    }

    async fn start_containers(&self, id: &ManifestUniqueId) -> Result<(), LifecycleError> {
        let mut containers = self.runtime.read_containers_by_label(id).await?;
        if containers.is_empty() {
            return Err(LifecycleError::NoContainers(id.clone()));
        }

        // Same reachability rule as deploy: last stage first
        containers.sort_by_key(|c| Reverse(labels::stage_index(&c.labels)));

        for container in containers.iter().filter(|c| !c.is_running()) {
            self.runtime.start_container(&container.id).await?;
            debug!("Started container {}", container.name());
        }

        Ok(())
    }
}

#[async_trait]
impl LifecycleService for StandardLifecycleService {
    async fn deploy(&self, manifest: &Manifest) -> Result<Outcome, LifecycleError> {
        let id = manifest.id();
        let _guard = self.lock(&id).await;

        if let Some(record) = self.registry.get(&id) {
            if record.status != DeploymentStatus::Undeployed {
                return Ok(self.skip("deploy", &id, SkipReason::AlreadyDeployed(record.status)));
            }
        }

        // Validation happens before any state change
        let compiled = compile(manifest)?;

        info!(
            "Deploying {} ({} module(s))",
            id,
            compiled.configs.len()
        );

        self.begin(&id)?;

        match self.apply_deploy(&compiled).await {
            Ok(count) => {
                info!("Deployed {} with {} container(s)", id, count);
                Ok(Outcome::Applied)
            }
            Err(e) => {
                error!("Deploy of {} failed: {}; rolling back", id, e);
                let cleanup = self.teardown(&id).await;
                if !cleanup.is_empty() {
                    warn!("Rollback of {} incomplete: {}", id, cleanup.join("; "));
                }
                Err(self.fail(&id, e))
            }
        }
    }

    async fn stop(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError> {
        let _guard = self.lock(id).await;

        let Some(record) = self.registry.get(id) else {
            return Ok(self.skip("stop", id, SkipReason::NotFound));
        };
        if record.status != DeploymentStatus::Running {
            let reason = SkipReason::WrongStatus {
                expected: DeploymentStatus::Running,
                actual: record.status,
            };
            return Ok(self.skip("stop", id, reason));
        }

        info!("Stopping {}", id);
        self.begin(id)?;

        let result = match self.stop_containers(id).await {
            Ok(()) => self
                .finish(id, DeploymentStatus::Stopped)
                .map_err(LifecycleError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Stopped {}", id);
                Ok(Outcome::Applied)
            }
            Err(e) => {
                error!("Stop of {} failed: {}", id, e);
                Err(self.fail(id, e))
            }
        }
    }

    async fn resume(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError> {
        let _guard = self.lock(id).await;

        let Some(record) = self.registry.get(id) else {
            return Ok(self.skip("resume", id, SkipReason::NotFound));
        };
        if record.status != DeploymentStatus::Stopped {
            let reason = SkipReason::WrongStatus {
                expected: DeploymentStatus::Stopped,
                actual: record.status,
            };
            return Ok(self.skip("resume", id, reason));
        }

        info!("Resuming {}", id);
        self.begin(id)?;

        let result = match self.start_containers(id).await {
            Ok(()) => self
                .finish(id, DeploymentStatus::Running)
                .map_err(LifecycleError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Resumed {}", id);
                Ok(Outcome::Applied)
            }
            Err(e) => {
                error!("Resume of {} failed: {}", id, e);
                Err(self.fail(id, e))
            }
        }
    }

    async fn undeploy(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError> {
        let _guard = self.lock(id).await;

        if self.registry.get(id).is_none() {
            return Ok(self.skip("undeploy", id, SkipReason::NotFound));
        }

        info!("Undeploying {}", id);
        self.begin(id)?;

        let errors = self.teardown(id).await;
        if !errors.is_empty() {
            return Err(self.fail(id, LifecycleError::PartialCleanup(errors)));
        }

        let recorded = self
            .registry
            .set_container_count(id, 0)
            .and_then(|()| self.finish(id, DeploymentStatus::Undeployed));
        if let Err(e) = recorded {
            return Err(self.fail(id, e.into()));
        }

        info!("Undeployed {}", id);
        Ok(Outcome::Applied)
    }

    async fn remove(&self, id: &ManifestUniqueId) -> Result<Outcome, LifecycleError> {
        let _guard = self.lock(id).await;

        let Some(record) = self.registry.get(id) else {
            return Ok(self.skip("remove", id, SkipReason::NotFound));
        };

        info!("Removing {}", id);
        self.begin(id)?;

        let mut errors = self.teardown(id).await;
        if errors.is_empty() {
            if let Err(e) = self.registry.set_container_count(id, 0) {
                return Err(self.fail(id, e.into()));
            }
        }
        errors.extend(self.remove_orphaned_images(&record.images).await);

        if !errors.is_empty() {
            return Err(self.fail(id, LifecycleError::PartialCleanup(errors)));
        }

        if let Err(e) = self.registry.delete(id) {
            return Err(self.fail(id, e.into()));
        }
        info!("Removed {}", id);

        if let Err(e) = self.sink.notify_removed(id).await {
            warn!("{:#}", e);
        }

        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FileManifestRegistry, RecordingSink};
    use crate::runtime::fake::{Call, FakeRuntime};
    use tether_core::domain::container::ContainerState;
    use tether_core::domain::record::ManifestRecord;
    use tether_manifest::parse_manifest;

    struct Harness {
        runtime: Arc<FakeRuntime>,
        registry: Arc<FileManifestRegistry>,
        sink: Arc<RecordingSink>,
        service: StandardLifecycleService,
    }

    fn harness_with(runtime: FakeRuntime) -> Harness {
        let runtime = Arc::new(runtime);
        let registry = Arc::new(FileManifestRegistry::in_memory());
        let sink = Arc::new(RecordingSink::default());
        let service = StandardLifecycleService::new(
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&registry) as Arc<dyn ManifestRegistry>,
            Arc::clone(&sink) as Arc<dyn StatusSink>,
        );
        Harness {
            runtime,
            registry,
            sink,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeRuntime::new())
    }

    /// Registry whose `set_images` always fails
    struct ImagesUnwritable(FileManifestRegistry);

    impl ManifestRegistry for ImagesUnwritable {
        fn get(&self, id: &ManifestUniqueId) -> Option<ManifestRecord> {
            self.0.get(id)
        }

        fn get_all(&self) -> Vec<ManifestRecord> {
            self.0.get_all()
        }

        fn upsert(
            &self,
            id: &ManifestUniqueId,
            status: DeploymentStatus,
        ) -> Result<(), RegistryError> {
            self.0.upsert(id, status)
        }

        fn delete(&self, id: &ManifestUniqueId) -> Result<(), RegistryError> {
            self.0.delete(id)
        }

        fn set_in_transition(
            &self,
            id: &ManifestUniqueId,
            value: bool,
        ) -> Result<(), RegistryError> {
            self.0.set_in_transition(id, value)
        }

        fn set_container_count(
            &self,
            id: &ManifestUniqueId,
            count: usize,
        ) -> Result<(), RegistryError> {
            self.0.set_container_count(id, count)
        }

        fn set_images(&self, _: &ManifestUniqueId, _: Vec<String>) -> Result<(), RegistryError> {
            Err(RegistryError::Write {
                path: "registry.json".into(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn set_last_log_read(
            &self,
            id: &ManifestUniqueId,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), RegistryError> {
            self.0.set_last_log_read(id, at)
        }

        fn replace_status_if_idle(
            &self,
            id: &ManifestUniqueId,
            expected: DeploymentStatus,
            new: DeploymentStatus,
        ) -> Result<bool, RegistryError> {
            self.0.replace_status_if_idle(id, expected, new)
        }
    }

    /// `pump-app` v1 with stages A, B, C
    fn pump_app() -> Manifest {
        parse_manifest(
            r#"{
            "applicationName": "pump-app",
            "version": "1",
            "modules": [
                { "name": "a", "image": "edge/a:1" },
                { "name": "b", "image": "edge/b:1" },
                { "name": "c", "image": "edge/c:1" }
            ]
        }"#,
        )
        .unwrap()
    }

    fn id() -> ManifestUniqueId {
        ManifestUniqueId::new("pump-app", "1")
    }

    fn status(h: &Harness) -> Option<DeploymentStatus> {
        h.registry.get(&id()).map(|r| r.status)
    }

    fn created(h: &Harness) -> Vec<String> {
        h.runtime
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateAndStart(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_deploy_scenario_call_order() {
        let h = harness();

        let outcome = h.service.deploy(&pump_app()).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);

        assert_eq!(
            h.runtime.calls(),
            vec![
                Call::PullImage("edge/c:1".to_string()),
                Call::PullImage("edge/b:1".to_string()),
                Call::PullImage("edge/a:1".to_string()),
                Call::CreateNetwork("pump-app-1".to_string()),
                Call::CreateAndStart("pump-app-1-edge_c-1-2".to_string()),
                Call::CreateAndStart("pump-app-1-edge_b-1-1".to_string()),
                Call::CreateAndStart("pump-app-1-edge_a-1-0".to_string()),
            ]
        );

        let record = h.registry.get(&id()).unwrap();
        assert_eq!(record.status, DeploymentStatus::Running);
        assert_eq!(record.container_count, 3);
        assert!(!record.in_transition);
        assert_eq!(record.images, vec!["edge/a:1", "edge/b:1", "edge/c:1"]);
    }

    #[tokio::test]
    async fn test_deploy_skips_present_images() {
        let h = harness_with(FakeRuntime::new().with_local_image("edge/b:1"));

        h.service.deploy(&pump_app()).await.unwrap();

        let pulls: Vec<Call> = h
            .runtime
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::PullImage(_)))
            .collect();
        assert_eq!(
            pulls,
            vec![
                Call::PullImage("edge/c:1".to_string()),
                Call::PullImage("edge/a:1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_deploy_passes_wired_configs_to_runtime() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();

        let configs = h.runtime.created_configs();
        // Created in reverse stage order: c, b, a
        let (c, b, a) = (&configs[0], &configs[1], &configs[2]);

        assert_eq!(a.env_value("NEXT_CONTAINER_NAME"), Some(b.container_name.as_str()));
        assert_eq!(b.env_value("PREV_CONTAINER_NAME"), Some(a.container_name.as_str()));
        assert_eq!(c.env_value("EGRESS_URL"), Some("none"));
        assert!(configs.iter().all(|cfg| cfg.network_name == "pump-app-1"));
    }

    #[tokio::test]
    async fn test_deploy_is_idempotent() {
        let h = harness();

        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.clear_calls();

        let outcome = h.service.deploy(&pump_app()).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::AlreadyDeployed(DeploymentStatus::Running))
        );
        assert!(h.runtime.calls().is_empty());
        assert_eq!(h.runtime.networks().len(), 1);
        assert_eq!(h.runtime.containers().len(), 3);
    }

    #[tokio::test]
    async fn test_deploy_invalid_manifest_changes_nothing() {
        let h = harness();
        let mut manifest = pump_app();
        manifest.modules.clear();

        let result = h.service.deploy(&manifest).await;

        assert!(matches!(result, Err(LifecycleError::Validation(_))));
        assert!(h.registry.get_all().is_empty());
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_container_failure_rolls_back() {
        let h = harness();
        // Stage 1 is the second container created
        h.runtime.fail_create("edge_b");

        let result = h.service.deploy(&pump_app()).await;

        assert!(matches!(result, Err(LifecycleError::ResourceCreation { .. })));
        assert_eq!(
            created(&h),
            vec!["pump-app-1-edge_c-1-2".to_string(), "pump-app-1-edge_b-1-1".to_string()]
        );

        // Nothing left behind, but the record stays as Error
        assert!(h.runtime.read_containers_by_label(&id()).await.unwrap().is_empty());
        assert!(h.runtime.networks().is_empty());

        let record = h.registry.get(&id()).unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
        assert_eq!(record.container_count, 0);
        assert!(!record.in_transition);
    }

    #[tokio::test]
    async fn test_deploy_pull_failure_rolls_back() {
        let h = harness();
        h.runtime.fail_pull("edge/b:1");

        let result = h.service.deploy(&pump_app()).await;

        assert!(matches!(result, Err(LifecycleError::Pull { ref image, .. }) if image == "edge/b:1"));
        assert!(created(&h).is_empty());
        assert!(h.runtime.calls().contains(&Call::NetworkPrune(id())));
        assert_eq!(status(&h), Some(DeploymentStatus::Error));
    }

    #[tokio::test]
    async fn test_deploy_after_failure_is_skipped_until_undeploy() {
        let h = harness();
        h.runtime.fail_pull("edge/a:1");
        assert!(h.service.deploy(&pump_app()).await.is_err());

        let outcome = h.service.deploy(&pump_app()).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::AlreadyDeployed(DeploymentStatus::Error))
        );
    }

    #[tokio::test]
    async fn test_redeploy_creates_new_network() {
        let h = harness();

        h.service.deploy(&pump_app()).await.unwrap();
        let first = h.runtime.networks()[0].serial;

        assert_eq!(h.service.undeploy(&id()).await.unwrap(), Outcome::Applied);
        assert!(h.runtime.networks().is_empty());
        assert_eq!(status(&h), Some(DeploymentStatus::Undeployed));

        assert_eq!(h.service.deploy(&pump_app()).await.unwrap(), Outcome::Applied);
        let networks = h.runtime.networks();
        assert_eq!(networks.len(), 1);
        assert_ne!(networks[0].serial, first);
        assert_eq!(status(&h), Some(DeploymentStatus::Running));
    }

    #[tokio::test]
    async fn test_two_versions_deploy_side_by_side() {
        let h = harness();
        let mut v2 = pump_app();
        v2.version = "2".to_string();
        let v2_id = ManifestUniqueId::new("pump-app", "2");

        assert_eq!(h.service.deploy(&pump_app()).await.unwrap(), Outcome::Applied);
        assert_eq!(h.service.deploy(&v2).await.unwrap(), Outcome::Applied);

        let mut networks: Vec<String> = h.runtime.networks().into_iter().map(|n| n.name).collect();
        networks.sort();
        assert_eq!(networks, vec!["pump-app-1", "pump-app-2"]);

        let names: HashSet<String> = h
            .runtime
            .containers()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names.len(), 6);

        assert_eq!(status(&h), Some(DeploymentStatus::Running));
        assert_eq!(
            h.registry.get(&v2_id).map(|r| r.status),
            Some(DeploymentStatus::Running)
        );

        // Undeploying one version leaves the other untouched
        h.service.undeploy(&id()).await.unwrap();
        let networks: Vec<String> = h.runtime.networks().into_iter().map(|n| n.name).collect();
        assert_eq!(networks, vec!["pump-app-2"]);
        assert_eq!(h.runtime.read_containers_by_label(&v2_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_registry_failure_during_deploy_clears_transition() {
        let runtime = Arc::new(FakeRuntime::new());
        let registry = Arc::new(ImagesUnwritable(FileManifestRegistry::in_memory()));
        let service = StandardLifecycleService::new(
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&registry) as Arc<dyn ManifestRegistry>,
            Arc::new(RecordingSink::default()) as Arc<dyn StatusSink>,
        );

        let result = service.deploy(&pump_app()).await;

        assert!(matches!(result, Err(LifecycleError::Registry(_))));
        let record = registry.get(&id()).unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
        assert!(!record.in_transition);
        assert!(runtime.containers().is_empty());
        assert!(runtime.networks().is_empty());
    }

    #[tokio::test]
    async fn test_stop_and_resume() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.clear_calls();

        assert_eq!(h.service.stop(&id()).await.unwrap(), Outcome::Applied);
        assert_eq!(status(&h), Some(DeploymentStatus::Stopped));
        assert!(h.runtime.containers().iter().all(|c| c.exited_cleanly()));

        h.runtime.clear_calls();
        assert_eq!(h.service.resume(&id()).await.unwrap(), Outcome::Applied);
        assert_eq!(status(&h), Some(DeploymentStatus::Running));
        assert_eq!(
            h.runtime.calls(),
            vec![
                Call::Start("pump-app-1-edge_c-1-2".to_string()),
                Call::Start("pump-app-1-edge_b-1-1".to_string()),
                Call::Start("pump-app-1-edge_a-1-0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.service.stop(&id()).await.unwrap();
        h.runtime.clear_calls();

        let outcome = h.service.stop(&id()).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::WrongStatus {
                expected: DeploymentStatus::Running,
                actual: DeploymentStatus::Stopped,
            })
        );
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_requires_stopped() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();

        let outcome = h.service.resume(&id()).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(SkipReason::WrongStatus { .. })));
        assert_eq!(status(&h), Some(DeploymentStatus::Running));
    }

    #[tokio::test]
    async fn test_stop_with_no_containers_is_error() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.remove_out_of_band("pump-app");

        let result = h.service.stop(&id()).await;

        assert!(matches!(result, Err(LifecycleError::NoContainers(_))));
        assert_eq!(status(&h), Some(DeploymentStatus::Error));
        assert!(!h.registry.get(&id()).unwrap().in_transition);
    }

    #[tokio::test]
    async fn test_stop_failure_marks_error() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.fail_stop("edge_b");

        let result = h.service.stop(&id()).await;

        assert!(matches!(result, Err(LifecycleError::Runtime(_))));
        assert_eq!(status(&h), Some(DeploymentStatus::Error));
    }

    #[tokio::test]
    async fn test_resume_only_starts_stopped_containers() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.service.stop(&id()).await.unwrap();
        h.runtime
            .set_container_state("edge_b", ContainerState::Running, None);
        h.runtime.clear_calls();

        h.service.resume(&id()).await.unwrap();

        assert_eq!(
            h.runtime.calls(),
            vec![
                Call::Start("pump-app-1-edge_c-1-2".to_string()),
                Call::Start("pump-app-1-edge_a-1-0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_operations_on_unknown_manifest_are_noops() {
        let h = harness();
        let unknown = ManifestUniqueId::new("ghost", "9");

        for outcome in [
            h.service.stop(&unknown).await.unwrap(),
            h.service.resume(&unknown).await.unwrap(),
            h.service.undeploy(&unknown).await.unwrap(),
            h.service.remove(&unknown).await.unwrap(),
        ] {
            assert_eq!(outcome, Outcome::Skipped(SkipReason::NotFound));
        }

        assert!(h.runtime.calls().is_empty());
        assert!(h.registry.get_all().is_empty());
    }

    #[tokio::test]
    async fn test_undeploy_partial_cleanup() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.fail_remove("edge_a");

        let result = h.service.undeploy(&id()).await;

        match result {
            Err(LifecycleError::PartialCleanup(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("edge_a"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // The other containers were still removed and the network pruned
        assert_eq!(h.runtime.containers().len(), 1);
        assert!(h.runtime.calls().contains(&Call::NetworkPrune(id())));
        assert_eq!(status(&h), Some(DeploymentStatus::Error));
    }

    #[tokio::test]
    async fn test_undeploy_twice_is_harmless() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();

        h.service.undeploy(&id()).await.unwrap();
        assert_eq!(h.service.undeploy(&id()).await.unwrap(), Outcome::Applied);

        let record = h.registry.get(&id()).unwrap();
        assert_eq!(record.status, DeploymentStatus::Undeployed);
        assert_eq!(record.container_count, 0);
    }

    #[tokio::test]
    async fn test_remove_deletes_record_and_orphaned_images() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        // Another workload keeps edge/b:1 alive
        h.runtime.add_foreign_container("other", "edge/b:1");

        assert_eq!(h.service.remove(&id()).await.unwrap(), Outcome::Applied);

        assert!(h.registry.get(&id()).is_none());
        assert!(!h.runtime.has_image("edge/a:1"));
        assert!(h.runtime.has_image("edge/b:1"));
        assert!(!h.runtime.has_image("edge/c:1"));
        assert_eq!(h.sink.removed.lock().unwrap().clone(), vec![id()]);

        // Re-delivery of the same remove is a no-op
        assert_eq!(
            h.service.remove(&id()).await.unwrap(),
            Outcome::Skipped(SkipReason::NotFound)
        );
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_record() {
        let h = harness();
        h.service.deploy(&pump_app()).await.unwrap();
        h.runtime.fail_remove("edge_c");

        let result = h.service.remove(&id()).await;

        assert!(matches!(result, Err(LifecycleError::PartialCleanup(_))));
        assert_eq!(status(&h), Some(DeploymentStatus::Error));
        // The image of the surviving container is retained
        assert!(h.runtime.has_image("edge/c:1"));
        assert!(h.sink.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_after_failed_deploy() {
        let h = harness();
        h.runtime.fail_create("edge_a");
        assert!(h.service.deploy(&pump_app()).await.is_err());

        assert_eq!(h.service.remove(&id()).await.unwrap(), Outcome::Applied);

        assert!(h.registry.get(&id()).is_none());
        assert!(!h.runtime.has_image("edge/a:1"));
    }

    #[tokio::test]
    async fn test_concurrent_deploys_of_same_manifest_serialise() {
        let h = Arc::new(harness());

        let first = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.service.deploy(&pump_app()).await })
        };
        let second = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.service.deploy(&pump_app()).await })
        };

        let outcomes = [
            first.await.unwrap().unwrap(),
            second.await.unwrap().unwrap(),
        ];

        assert!(outcomes.contains(&Outcome::Applied));
        assert!(outcomes.iter().any(|o| matches!(o, Outcome::Skipped(_))));
        assert_eq!(h.runtime.networks().len(), 1);
        assert_eq!(h.runtime.containers().len(), 3);
    }
}
