//! Mount table with longest-prefix routing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::traits::{MountRegistry, Storage};
use crate::types::{Mount, MountOptions, TreePath};

/// Routes tree paths to mounted storages.
///
/// Mount points are matched by longest prefix. If `alice` and
/// `alice/files/share` are both mounted, `alice/files/share/doc.txt` is
/// routed to the `alice/files/share` mount.
#[derive(Default)]
pub struct MemoryMountRegistry {
    /// Mounts, keyed by mount point.
    mounts: RwLock<BTreeMap<TreePath, Mount>>,
}

impl std::fmt::Debug for MemoryMountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMountRegistry")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl MemoryMountRegistry {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a storage at the given path, replacing any previous mount there.
    pub async fn mount(&self, mount_point: impl Into<TreePath>, storage: Arc<dyn Storage>, options: MountOptions) {
        let mount = Mount::new(mount_point, storage, options);
        let mut mounts = self.mounts.write().await;
        mounts.insert(mount.mount_point().clone(), mount);
    }

    /// Detaches the mount at the given path.
    ///
    /// Returns `true` if a mount was removed.
    pub async fn unmount(&self, mount_point: impl Into<TreePath>) -> bool {
        let mut mounts = self.mounts.write().await;
        mounts.remove(&mount_point.into()).is_some()
    }

    /// Lists all current mounts, ordered by mount point.
    pub async fn list_mounts(&self) -> Vec<Mount> {
        let mounts = self.mounts.read().await;
        mounts.values().cloned().collect()
    }
}

#[async_trait]
impl MountRegistry for MemoryMountRegistry {
    async fn find_mount(&self, path: &TreePath) -> StorageResult<Mount> {
        let mounts = self.mounts.read().await;
        mounts
            .values()
            .filter(|mount| path.starts_with(mount.mount_point()))
            .max_by_key(|mount| mount.mount_point().as_str().len())
            .cloned()
            .ok_or_else(|| StorageError::NoMount {
                path: path.to_string(),
            })
    }

    async fn find_mounts_under(&self, path: &TreePath) -> Vec<Mount> {
        let mounts = self.mounts.read().await;
        mounts
            .values()
            .filter(|mount| mount.mount_point() != path && mount.mount_point().starts_with(path))
            .cloned()
            .collect()
    }

    async fn relocate(&self, from: &TreePath, to: &TreePath) -> StorageResult<()> {
        let mut mounts = self.mounts.write().await;
        if mounts.contains_key(to) {
            return Err(StorageError::AlreadyExists {
                path: to.to_string(),
            });
        }
        let mount = mounts.remove(from).ok_or_else(|| StorageError::NoMount {
            path: from.to_string(),
        })?;
        tracing::debug!(from = %from, to = %to, storage = mount.storage().id(), "relocating mount");
        mounts.insert(to.clone(), mount.relocated(to.clone()));
        Ok(())
    }
}
