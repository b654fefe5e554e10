//! Contracts of the collaborators the node tree is built on.
//!
//! The tree itself only talks to a [`PathView`] and a [`MountRegistry`].
//! Views in turn route through the registry to [`Storage`] instances. The
//! in-memory implementations in [`crate::memory`] and [`crate::view`] satisfy
//! these contracts for tests and tooling; production deployments plug in
//! their own drivers.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;
use crate::types::{FileInfo, Metadata, Mount, TreePath};

/// A storage backend addressed by internal, mount-relative paths.
///
/// The empty internal path is the storage root.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stable identifier of this storage.
    fn id(&self) -> &str;

    /// Looks up metadata in the storage's persistent index.
    ///
    /// # Returns
    /// `Ok(None)` when the index has no entry for the path.
    async fn metadata(&self, path: &str) -> StorageResult<Option<Metadata>>;

    /// Reads metadata straight from the backend, bypassing the index.
    ///
    /// Used for entries the index does not know yet, such as upload parts
    /// still being written.
    async fn scan(&self, path: &str) -> StorageResult<Option<Metadata>>;

    /// Returns the names of the indexed children of a directory.
    async fn list(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Reads the whole content of a file.
    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// Creates or replaces a file with `data`.
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// Creates a directory. The parent must exist.
    async fn mkdir(&self, path: &str) -> StorageResult<()>;

    /// Removes a file or a directory with everything below it.
    async fn remove(&self, path: &str) -> StorageResult<()>;

    /// Renames an entry inside this storage.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Copies an entry inside this storage, recursively for directories.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;
}

/// Maps absolute tree paths onto mounts.
#[async_trait]
pub trait MountRegistry: Send + Sync {
    /// Returns the mount with the longest mount point covering `path`.
    ///
    /// A root mount must exist, so every path has an owning mount.
    async fn find_mount(&self, path: &TreePath) -> StorageResult<Mount>;

    /// Returns every mount whose mount point lies strictly below `path`.
    async fn find_mounts_under(&self, path: &TreePath) -> Vec<Mount>;

    /// Moves the mount attached at `from` so that it is attached at `to`.
    async fn relocate(&self, from: &TreePath, to: &TreePath) -> StorageResult<()>;
}

/// A path based facade over the mounted storages.
///
/// Paths handed to a view are relative to the view root; the view translates
/// them into absolute tree paths and routes them to the owning mount.
#[async_trait]
pub trait PathView: Send + Sync {
    /// Translates a view-relative path into an absolute tree path.
    fn absolute_path(&self, path: &TreePath) -> TreePath;

    /// Returns the mount owning `path`.
    async fn mount_for(&self, path: &TreePath) -> StorageResult<Mount>;

    /// Looks up the indexed entry at `path`.
    async fn file_info(&self, path: &TreePath) -> StorageResult<Option<FileInfo>>;

    /// Lists a directory, including mounts attached directly inside it.
    async fn list_directory(&self, path: &TreePath) -> StorageResult<Vec<FileInfo>>;

    /// Renames `source` to `target`, across mounts if needed.
    ///
    /// Either the whole rename happens or nothing changes.
    ///
    /// # Returns
    /// `Ok(false)` when the view refused the rename without a more specific
    /// error.
    async fn rename(&self, source: &TreePath, target: &TreePath) -> StorageResult<bool>;

    /// Copies `source` to `target` recursively, replacing whatever exists at
    /// `target`.
    async fn copy(&self, source: &TreePath, target: &TreePath) -> StorageResult<()>;

    /// Whether the entry at `path` may be changed or renamed.
    async fn is_updatable(&self, path: &TreePath) -> StorageResult<bool>;

    /// Whether new entries may be created inside the directory at `path`.
    async fn is_creatable(&self, path: &TreePath) -> StorageResult<bool>;

    /// Whether the entry at `path` may be removed from its parent.
    async fn is_deletable(&self, path: &TreePath) -> StorageResult<bool>;

    /// Checks `name` against the naming rules for entries inside `dir`.
    fn verify_path_name(&self, dir: &TreePath, name: &str) -> StorageResult<()>;
}
