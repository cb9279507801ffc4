//! Known-manifest registry
//!
//! Durable table of deployment records, one per `ManifestUniqueId`. Both the
//! command path and the status reconciler use it, so every read-modify-write
//! happens under a single lock, and every mutation is written to disk before
//! the lock is released. A mutation is staged on a copy of the table and only
//! becomes visible once the write succeeds, so memory never runs ahead of the
//! file.
//!
//! Writes are blocking `std::fs` calls made while holding the lock. The table
//! is small and written a handful of times per command, so async callers
//! invoke it directly rather than through `spawn_blocking`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use tether_core::domain::manifest::ManifestUniqueId;
use tether_core::domain::record::{DeploymentStatus, ManifestRecord};

/// Errors raised while loading or persisting the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write registry file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Store of deployment records
///
/// `upsert` is the only operation that creates a record; the `set_*`
/// operations ignore IDs that are not tracked.
pub trait ManifestRegistry: Send + Sync {
    fn get(&self, id: &ManifestUniqueId) -> Option<ManifestRecord>;

    /// All records, in insertion order
    fn get_all(&self) -> Vec<ManifestRecord>;

    /// Sets the status, creating the record if absent
    fn upsert(&self, id: &ManifestUniqueId, status: DeploymentStatus) -> Result<(), RegistryError>;

    fn delete(&self, id: &ManifestUniqueId) -> Result<(), RegistryError>;

    fn set_in_transition(&self, id: &ManifestUniqueId, value: bool) -> Result<(), RegistryError>;

    fn set_container_count(&self, id: &ManifestUniqueId, count: usize)
    -> Result<(), RegistryError>;

    fn set_images(&self, id: &ManifestUniqueId, images: Vec<String>) -> Result<(), RegistryError>;

    fn set_last_log_read(
        &self,
        id: &ManifestUniqueId,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Sets `new` only if the record is still `expected` and not in transition
    ///
    /// # Returns
    /// `true` if the status was replaced
    fn replace_status_if_idle(
        &self,
        id: &ManifestUniqueId,
        expected: DeploymentStatus,
        new: DeploymentStatus,
    ) -> Result<bool, RegistryError>;
}

/// Registry persisted as a JSON array in a local file
///
/// Without a path (`in_memory`) nothing is written.
pub struct FileManifestRegistry {
    path: Option<PathBuf>,
    records: Mutex<Vec<ManifestRecord>>,
}

impl FileManifestRegistry {
    /// Loads the registry from `path`
    ///
    /// A missing file is an empty registry. If the file holds duplicate IDs
    /// the last entry wins.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let records = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => {
                let loaded: Vec<ManifestRecord> =
                    serde_json::from_str(&content).map_err(|source| RegistryError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                dedupe(loaded)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No registry file at {}, starting with an empty registry",
                    path.display()
                );
                Vec::new()
            }
            Err(source) => {
                return Err(RegistryError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };

        info!(
            "Loaded {} manifest record(s) from {}",
            records.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// Creates a registry that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<ManifestRecord>> {
        // Records are only replaced whole, so a poisoned lock still holds a consistent table
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persists `next` and, only on success, makes it the live table
    fn commit(
        &self,
        records: &mut Vec<ManifestRecord>,
        next: Vec<ManifestRecord>,
    ) -> Result<(), RegistryError> {
        self.persist(&next)?;
        *records = next;
        Ok(())
    }

    /// Applies `f` to the record for `id`, persisting if it exists
    fn update(
        &self,
        id: &ManifestUniqueId,
        f: impl FnOnce(&mut ManifestRecord),
    ) -> Result<(), RegistryError> {
        let mut records = self.records();
        let mut next = records.clone();
        match next.iter_mut().find(|r| &r.id == id) {
            Some(record) => {
                f(record);
                self.commit(&mut records, next)
            }
            None => {
                debug!("Ignoring update for untracked manifest {}", id);
                Ok(())
            }
        }
    }

    /// Writes the whole table to a temp file and renames it into place
    fn persist(&self, records: &[ManifestRecord]) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(records)?;
        let tmp = tmp_path(path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RegistryError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(&tmp, content).map_err(|source| RegistryError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| RegistryError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn dedupe(loaded: Vec<ManifestRecord>) -> Vec<ManifestRecord> {
    let mut records: Vec<ManifestRecord> = Vec::with_capacity(loaded.len());
    for record in loaded {
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            warn!("Duplicate registry entry for {}, keeping the last one", record.id);
            *existing = record;
        } else {
            records.push(record);
        }
    }
    records
}

impl ManifestRegistry for FileManifestRegistry {
    fn get(&self, id: &ManifestUniqueId) -> Option<ManifestRecord> {
        self.records().iter().find(|r| &r.id == id).cloned()
    }

    fn get_all(&self) -> Vec<ManifestRecord> {
        self.records().clone()
    }

    fn upsert(&self, id: &ManifestUniqueId, status: DeploymentStatus) -> Result<(), RegistryError> {
        let mut records = self.records();
        let mut next = records.clone();
        match next.iter_mut().find(|r| &r.id == id) {
            Some(record) => record.status = status,
            None => next.push(ManifestRecord::new(id.clone(), status)),
        }
        self.commit(&mut records, next)?;
        debug!("Manifest {} -> {}", id, status);
        Ok(())
    }

    fn delete(&self, id: &ManifestUniqueId) -> Result<(), RegistryError> {
        let mut records = self.records();
        let next: Vec<ManifestRecord> = records.iter().filter(|r| &r.id != id).cloned().collect();
        if next.len() == records.len() {
            return Ok(());
        }
        self.commit(&mut records, next)?;
        debug!("Manifest {} deleted from registry", id);
        Ok(())
    }

    fn set_in_transition(&self, id: &ManifestUniqueId, value: bool) -> Result<(), RegistryError> {
        self.update(id, |r| r.in_transition = value)
    }

    fn set_container_count(
        &self,
        id: &ManifestUniqueId,
        count: usize,
    ) -> Result<(), RegistryError> {
        self.update(id, |r| r.container_count = count)
    }

    fn set_images(&self, id: &ManifestUniqueId, images: Vec<String>) -> Result<(), RegistryError> {
        self.update(id, |r| r.images = images)
    }

    fn set_last_log_read(
        &self,
        id: &ManifestUniqueId,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.update(id, |r| r.last_log_read_timestamp = Some(at))
    }

    fn replace_status_if_idle(
        &self,
        id: &ManifestUniqueId,
        expected: DeploymentStatus,
        new: DeploymentStatus,
    ) -> Result<bool, RegistryError> {
        let mut records = self.records();
        let mut next = records.clone();
        let Some(record) = next.iter_mut().find(|r| &r.id == id) else {
            return Ok(false);
        };

        if record.in_transition || record.status != expected {
            return Ok(false);
        }

        record.status = new;
        self.commit(&mut records, next)?;
        Ok(true)
    }
}
