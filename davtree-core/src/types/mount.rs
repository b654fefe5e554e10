//! Mount-related types and configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::traits::Storage;
use crate::types::TreePath;

/// Options controlling how a storage is mounted into the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    /// Whether the mount itself can be relocated by moving its root
    #[serde(default)]
    pub movable: bool,

    /// Whether the mount rejects every mutation
    #[serde(default)]
    pub read_only: bool,
}

impl MountOptions {
    /// Creates a new MountOptions with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the mount as movable.
    pub fn movable(mut self) -> Self {
        self.movable = true;
        self
    }

    /// Sets the mount as read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A storage bound to a mount point in the tree.
///
/// Cloning is cheap; the storage handle is shared.
#[derive(Clone)]
pub struct Mount {
    mount_point: TreePath,
    storage: Arc<dyn Storage>,
    options: MountOptions,
}

impl Mount {
    /// Binds `storage` at `mount_point`.
    pub fn new(mount_point: impl Into<TreePath>, storage: Arc<dyn Storage>, options: MountOptions) -> Self {
        Self {
            mount_point: mount_point.into(),
            storage,
            options,
        }
    }

    /// Absolute path the mount is attached at.
    pub fn mount_point(&self) -> &TreePath {
        &self.mount_point
    }

    /// The storage backing this mount.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Options the mount was created with.
    pub fn options(&self) -> MountOptions {
        self.options
    }

    /// Returns true if the mount can be relocated as a unit.
    pub fn is_movable(&self) -> bool {
        self.options.movable
    }

    /// Returns true if the mount rejects mutations.
    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Translates an absolute tree path into the storage's internal path.
    ///
    /// Returns `None` if the path does not lie under this mount. The mount
    /// root translates to the empty internal path.
    pub fn internal_path(&self, absolute: &TreePath) -> Option<String> {
        absolute
            .strip_prefix(&self.mount_point)
            .map(String::from)
    }

    /// Returns a copy of this mount attached at a different point.
    pub fn relocated(&self, mount_point: TreePath) -> Self {
        Self {
            mount_point,
            storage: Arc::clone(&self.storage),
            options: self.options,
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("mount_point", &self.mount_point)
            .field("storage", &self.storage.id())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    #[test]
    fn test_mount_options_fluent() {
        let options = MountOptions::new().movable();
        assert!(options.movable);
        assert!(!options.read_only);

        let fluent = MountOptions::new().read_only();
        assert!(fluent.read_only);
        assert!(!fluent.movable);
    }

    #[test]
    fn test_internal_path() {
        let storage = Arc::new(MemoryStorage::new("share"));
        let mount = Mount::new("alice/files/share", storage, MountOptions::new().movable());

        assert_eq!(
            mount.internal_path(&TreePath::from("alice/files/share/doc.txt")),
            Some("doc.txt".to_string())
        );
        assert_eq!(
            mount.internal_path(&TreePath::from("alice/files/share")),
            Some(String::new())
        );
        assert_eq!(mount.internal_path(&TreePath::from("alice/files/other")), None);
        assert!(mount.is_movable());
    }

    #[test]
    fn test_relocated_keeps_storage() {
        let storage = Arc::new(MemoryStorage::new("share"));
        let mount = Mount::new("a", storage, MountOptions::new().movable());
        let moved = mount.relocated(TreePath::from("b/c"));

        assert_eq!(moved.mount_point().as_str(), "b/c");
        assert_eq!(moved.storage().id(), "share");
        assert!(moved.is_movable());
    }

    #[test]
    fn test_options_serde_defaults() {
        let options: MountOptions = serde_json::from_str("{\"movable\": true}").unwrap();
        assert!(options.movable);
        assert!(!options.read_only);
    }
}
