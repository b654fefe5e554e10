//! JSON snapshots of a mount table and the content of its storages.
//!
//! A snapshot can be loaded into the in-memory stack
//! ([`MemoryMountRegistry`] plus one [`MemoryStorage`] per storage id) and
//! captured back after the tree has been mutated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::StorageError;
use crate::memory::{MemoryMountRegistry, MemoryStorage};
use crate::types::{FileType, Mount, MountRecord, Permissions};

/// Errors reading, writing or applying a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot apply snapshot entry {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: StorageError,
    },
}

/// One entry stored in a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    /// Path inside the storage
    pub path: String,

    pub kind: FileType,

    /// File content; absent for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default = "Permissions::all")]
    pub permissions: Permissions,

    /// False for upload parts the index has not picked up yet
    #[serde(default = "default_indexed")]
    pub indexed: bool,
}

fn default_indexed() -> bool {
    true
}

/// A mount and, for the first mount of each storage, its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSnapshot {
    #[serde(flatten)]
    pub record: MountRecord,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntrySnapshot>,
}

/// Serializable state of a whole mount namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub mounts: Vec<MountSnapshot>,
}

/// The in-memory stack built from a snapshot.
#[derive(Debug)]
pub struct LoadedTree {
    pub registry: Arc<MemoryMountRegistry>,
    pub storages: BTreeMap<String, Arc<MemoryStorage>>,
    /// Mount table as loaded, so captures keep stable record ids.
    pub records: Vec<MountRecord>,
}

impl TreeSnapshot {
    /// Reads a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the snapshot as pretty printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds memory storages and a registry holding this snapshot.
    ///
    /// Mounts sharing a storage id share one storage instance.
    pub async fn build(&self) -> Result<LoadedTree, SnapshotError> {
        let registry = Arc::new(MemoryMountRegistry::new());
        let mut storages: BTreeMap<String, Arc<MemoryStorage>> = BTreeMap::new();
        let mut records = Vec::with_capacity(self.mounts.len());

        for mount in &self.mounts {
            let record = &mount.record;
            let storage = Arc::clone(
                storages
                    .entry(record.storage_id.clone())
                    .or_insert_with(|| Arc::new(MemoryStorage::new(record.storage_id.as_str()))),
            );
            records.push(record.clone());

            for entry in &mount.entries {
                apply_entry(&storage, entry)?;
            }
            registry
                .mount(record.mount_point.clone(), storage, record.options)
                .await;
        }

        tracing::debug!(
            mounts = self.mounts.len(),
            storages = storages.len(),
            "snapshot loaded"
        );
        Ok(LoadedTree {
            registry,
            storages,
            records,
        })
    }

    /// Captures the current mounts and storage contents.
    ///
    /// Mounts keep the record id they were loaded with, including mounts
    /// relocated since.
    pub async fn capture(loaded: &LoadedTree) -> Self {
        let current = loaded.registry.list_mounts().await;
        let ids = loaded.carried_ids(&current);

        let mut seen = Vec::new();
        let mut mounts = Vec::with_capacity(current.len());
        for (mount, id) in current.iter().zip(ids) {
            let storage_id = mount.storage().id().to_string();
            let mut record = MountRecord::new(mount.mount_point().clone(), storage_id.as_str(), mount.options());
            if let Some(id) = id {
                record.id = id;
            }
            let first = !seen.contains(&storage_id);
            if first {
                seen.push(storage_id.clone());
            }

            let entries = match loaded.storages.get(&storage_id) {
                Some(storage) if first => storage
                    .stored_entries()
                    .into_iter()
                    .map(|entry| EntrySnapshot {
                        path: entry.path,
                        kind: entry.file_type,
                        content: entry
                            .file_type
                            .is_file()
                            .then(|| String::from_utf8_lossy(&entry.data).into_owned()),
                        permissions: entry.permissions,
                        indexed: entry.indexed,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            mounts.push(MountSnapshot { record, entries });
        }
        Self { mounts }
    }
}

fn apply_entry(storage: &MemoryStorage, entry: &EntrySnapshot) -> Result<(), SnapshotError> {
    let content = entry.content.clone().unwrap_or_default();
    match (entry.kind, entry.indexed) {
        (FileType::Directory, _) => storage.seed_dir(&entry.path),
        (FileType::File, true) => storage.seed_file(&entry.path, content),
        (FileType::File, false) => storage.seed_part(&entry.path, content),
    }
    storage
        .set_permissions(&entry.path, entry.permissions)
        .map_err(|source| SnapshotError::Entry {
            path: entry.path.clone(),
            source,
        })
}

impl LoadedTree {
    /// Returns the storage with the given id.
    pub fn storage(&self, id: &str) -> Option<&Arc<MemoryStorage>> {
        self.storages.get(id)
    }

    /// Pairs each current mount with the id of the loaded record it came from.
    ///
    /// Mounts still at their loaded point match first; relocated mounts then
    /// take the remaining records of their storage in order.
    fn carried_ids(&self, current: &[Mount]) -> Vec<Option<Uuid>> {
        let mut claimed = vec![false; self.records.len()];
        let mut ids = vec![None; current.len()];

        for (slot, mount) in ids.iter_mut().zip(current) {
            let exact = self.records.iter().zip(&claimed).position(|(record, taken)| {
                !taken
                    && record.storage_id == mount.storage().id()
                    && &record.mount_point == mount.mount_point()
            });
            if let Some(index) = exact {
                claimed[index] = true;
                *slot = Some(self.records[index].id);
            }
        }
        for (slot, mount) in ids.iter_mut().zip(current) {
            if slot.is_some() {
                continue;
            }
            let moved = self
                .records
                .iter()
                .zip(&claimed)
                .position(|(record, taken)| !taken && record.storage_id == mount.storage().id());
            if let Some(index) = moved {
                claimed[index] = true;
                *slot = Some(self.records[index].id);
            }
        }
        ids
    }
}
