//! A [`PathView`] over a mount registry.
//!
//! `MountedView` roots a user's view of the namespace at some absolute path,
//! routes every request through the registry to the owning storage, and
//! applies the permission and naming rules of the tree.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::traits::{MountRegistry, PathView, Storage};
use crate::types::{FileInfo, Metadata, Mount, Permissions, TreeConfig, TreePath, DEFAULT_MAX_NAME_LENGTH};
use crate::validation;

/// Bits a read-only mount never grants.
const MUTATING: Permissions = Permissions::UPDATE
    .union(Permissions::CREATE)
    .union(Permissions::DELETE);

/// A hidden sibling of `internal` that a replacing move is staged under.
fn staging_path(internal: &str) -> String {
    let path = TreePath::from(internal);
    let (dir, name) = path.split();
    dir.join(format!(".{name}.{}.moving", Uuid::new_v4().simple()))
        .into()
}

/// Routes view-relative paths to mounted storages.
pub struct MountedView {
    root: TreePath,
    registry: Arc<dyn MountRegistry>,
    max_name_length: usize,
}

impl std::fmt::Debug for MountedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedView")
            .field("root", &self.root)
            .field("max_name_length", &self.max_name_length)
            .finish()
    }
}

impl MountedView {
    /// Creates a view rooted at `root`.
    pub fn new(root: impl Into<TreePath>, registry: Arc<dyn MountRegistry>) -> Self {
        Self {
            root: root.into(),
            registry,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }

    /// Creates a view using the root and naming limits of `config`.
    pub fn from_config(config: &TreeConfig, registry: Arc<dyn MountRegistry>) -> Self {
        Self::new(config.view_root.clone(), registry).with_max_name_length(config.max_name_length)
    }

    /// Overrides the maximum name length.
    pub fn with_max_name_length(mut self, max_name_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self
    }

    /// The absolute path this view is rooted at.
    pub fn root(&self) -> &TreePath {
        &self.root
    }

    /// Finds the owning mount and internal path of a view path.
    async fn locate(&self, path: &TreePath) -> StorageResult<(Mount, TreePath, String)> {
        let absolute = self.absolute_path(path);
        let mount = self.registry.find_mount(&absolute).await?;
        let internal = mount
            .internal_path(&absolute)
            .ok_or_else(|| StorageError::NoMount {
                path: absolute.to_string(),
            })?;
        Ok((mount, absolute, internal))
    }

    /// Applies mount level restrictions on top of the storage's bits.
    fn effective_permissions(mount: &Mount, internal: &str, metadata: &Metadata) -> Permissions {
        let mut permissions = metadata.permissions;
        if mount.is_read_only() {
            permissions.remove(MUTATING);
        }
        // A fixed mount point cannot be renamed or removed from inside the tree.
        if internal.is_empty() && !mount.mount_point().is_root() && !mount.is_movable() {
            permissions.remove(Permissions::UPDATE.union(Permissions::DELETE));
        }
        permissions
    }

    async fn permissions(&self, path: &TreePath) -> StorageResult<Option<(Metadata, Permissions)>> {
        Ok(self
            .file_info(path)
            .await?
            .map(|info| {
                let permissions = info.metadata.permissions;
                (info.metadata, permissions)
            }))
    }

    /// Copies a subtree between two storages without crossing nested mounts.
    async fn copy_between_storages(
        source: &Arc<dyn Storage>,
        from: &str,
        target: &Arc<dyn Storage>,
        to: &str,
    ) -> StorageResult<()> {
        let mut pending = vec![String::new()];
        while let Some(relative) = pending.pop() {
            let from_path = TreePath::from(from).join(&relative);
            let to_path = TreePath::from(to).join(&relative);
            let metadata = source
                .metadata(from_path.as_str())
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    path: from_path.as_str().to_string(),
                })?;
            if metadata.is_dir() {
                target.mkdir(to_path.as_str()).await?;
                for name in source.list(from_path.as_str()).await? {
                    pending.push(TreePath::from(relative.as_str()).join(name).into());
                }
            } else {
                let data = source.read(from_path.as_str()).await?;
                target.write(to_path.as_str(), data).await?;
            }
        }
        Ok(())
    }

    /// Moves an entry from one storage to another as a single step.
    ///
    /// When a file replaces a file, the copy lands on a staging name beside
    /// the destination and only takes its place once the source is gone, so
    /// any failure leaves both sides as they were.
    async fn move_between_storages(
        source: &Arc<dyn Storage>,
        from: &str,
        target: &Arc<dyn Storage>,
        to: &str,
        replace: bool,
    ) -> StorageResult<()> {
        let staged = if replace {
            staging_path(to)
        } else {
            to.to_string()
        };

        if let Err(err) = Self::copy_between_storages(source, from, target, &staged).await {
            Self::discard(target, &staged).await;
            return Err(err);
        }
        if let Err(err) = source.remove(from).await {
            Self::discard(target, &staged).await;
            return Err(err);
        }
        if replace {
            if let Err(err) = target.rename(&staged, to).await {
                match Self::copy_between_storages(target, &staged, source, from).await {
                    Ok(()) => Self::discard(target, &staged).await,
                    Err(restore) => warn!(
                        storage = source.id(),
                        path = from,
                        staged = %staged,
                        error = %restore,
                        "could not restore moved source"
                    ),
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Removes a partial copy, logging instead of failing.
    async fn discard(storage: &Arc<dyn Storage>, path: &str) {
        if let Err(err) = storage.remove(path).await {
            debug!(storage = storage.id(), path, error = %err, "partial copy not removed");
        }
    }

    /// Copies a subtree through the view, following nested mounts.
    async fn copy_tree(&self, source: &TreePath, target: &TreePath) -> StorageResult<()> {
        let mut pending = vec![(source.clone(), target.clone())];
        while let Some((src, dst)) = pending.pop() {
            let info = self
                .file_info(&src)
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    path: src.to_string(),
                })?;
            let (dst_mount, _, dst_internal) = self.locate(&dst).await?;
            if info.metadata.is_dir() {
                dst_mount.storage().mkdir(&dst_internal).await?;
                for child in self.list_directory(&src).await? {
                    let name = child.path.name().to_string();
                    pending.push((src.join(&name), dst.join(&name)));
                }
            } else {
                let data = info.storage.read(&info.internal_path).await?;
                dst_mount.storage().write(&dst_internal, data).await?;
            }
        }
        Ok(())
    }

    /// Moves a movable mount as a whole.
    async fn relocate_mount(&self, source: &TreePath, target: &TreePath) -> StorageResult<bool> {
        if self.file_info(target).await?.is_some() {
            return Ok(false);
        }
        match self.file_info(&target.parent()).await? {
            Some(parent) if parent.metadata.is_dir() => {}
            _ => return Ok(false),
        }
        self.registry
            .relocate(&self.absolute_path(source), &self.absolute_path(target))
            .await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl PathView for MountedView {
    fn absolute_path(&self, path: &TreePath) -> TreePath {
        self.root.join(path.as_str())
    }

    async fn mount_for(&self, path: &TreePath) -> StorageResult<Mount> {
        self.locate(path).await.map(|(mount, _, _)| mount)
    }

    async fn file_info(&self, path: &TreePath) -> StorageResult<Option<FileInfo>> {
        let (mount, absolute, internal) = self.locate(path).await?;
        let Some(mut metadata) = mount.storage().metadata(&internal).await? else {
            return Ok(None);
        };
        metadata.permissions = Self::effective_permissions(&mount, &internal, &metadata);
        Ok(Some(FileInfo {
            path: path.clone(),
            absolute_path: absolute,
            mount_point: mount.mount_point().clone(),
            storage: Arc::clone(mount.storage()),
            internal_path: internal,
            metadata,
        }))
    }

    async fn list_directory(&self, path: &TreePath) -> StorageResult<Vec<FileInfo>> {
        let (mount, absolute, internal) = self.locate(path).await?;
        let mut names = mount.storage().list(&internal).await?;

        // Mounts attached directly inside this directory show up as entries.
        for nested in self.registry.find_mounts_under(&absolute).await {
            if nested.mount_point().parent() == absolute {
                let name = nested.mount_point().name().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            if let Some(info) = self.file_info(&path.join(&name)).await? {
                entries.push(info);
            }
        }
        Ok(entries)
    }

    async fn rename(&self, source: &TreePath, target: &TreePath) -> StorageResult<bool> {
        let (src_mount, src_abs, src_internal) = self.locate(source).await?;
        let (dst_mount, _, dst_internal) = self.locate(target).await?;

        if src_internal.is_empty() {
            if src_mount.is_movable() && !src_abs.is_root() {
                debug!(source = %source, target = %target, "relocating movable mount");
                return self.relocate_mount(source, target).await;
            }
            return Ok(false);
        }
        if src_mount.is_read_only() || dst_mount.is_read_only() {
            return Ok(false);
        }

        let source_meta = src_mount
            .storage()
            .metadata(&src_internal)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                path: source.to_string(),
            })?;

        let nested = self.registry.find_mounts_under(&src_abs).await;
        if nested.iter().any(|mount| !mount.is_movable()) {
            debug!(source = %source, "refusing to strand fixed mounts below source");
            return Ok(false);
        }

        let src_storage = src_mount.storage();
        let dst_storage = dst_mount.storage();
        if src_storage.id() == dst_storage.id() {
            src_storage.rename(&src_internal, &dst_internal).await?;
        } else {
            let replace = match dst_storage.metadata(&dst_internal).await? {
                Some(existing) if existing.is_file() && source_meta.is_file() => true,
                Some(_) => return Ok(false),
                None => false,
            };
            Self::move_between_storages(src_storage, &src_internal, dst_storage, &dst_internal, replace)
                .await?;
        }

        let dst_abs = self.absolute_path(target);
        for mount in nested {
            if let Some(relative) = mount.mount_point().strip_prefix(&src_abs) {
                self.registry
                    .relocate(mount.mount_point(), &dst_abs.join(relative.as_str()))
                    .await?;
            }
        }
        debug!(source = %source, target = %target, "renamed");
        Ok(true)
    }

    async fn copy(&self, source: &TreePath, target: &TreePath) -> StorageResult<()> {
        let denied = || StorageError::PermissionDenied {
            path: target.to_string(),
            operation: "copy".to_string(),
        };

        let src_info = self
            .file_info(source)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                path: source.to_string(),
            })?;
        if target.starts_with(source) {
            return Err(denied());
        }
        let (dst_mount, _, dst_internal) = self.locate(target).await?;
        if dst_mount.is_read_only() || !self.is_creatable(&target.parent()).await? {
            return Err(denied());
        }

        if let Some(existing) = self.file_info(target).await? {
            if existing.internal_path.is_empty() || !self.is_deletable(target).await? {
                return Err(denied());
            }
            dst_mount.storage().remove(&dst_internal).await?;
        }

        let nested = self.registry.find_mounts_under(&src_info.absolute_path).await;
        if src_info.storage.id() == dst_mount.storage().id() && nested.is_empty() {
            src_info
                .storage
                .copy(&src_info.internal_path, &dst_internal)
                .await?;
        } else {
            self.copy_tree(source, target).await?;
        }
        debug!(source = %source, target = %target, "copied");
        Ok(())
    }

    async fn is_updatable(&self, path: &TreePath) -> StorageResult<bool> {
        Ok(self
            .permissions(path)
            .await?
            .is_some_and(|(_, p)| p.contains(Permissions::UPDATE)))
    }

    async fn is_creatable(&self, path: &TreePath) -> StorageResult<bool> {
        Ok(self
            .permissions(path)
            .await?
            .is_some_and(|(meta, p)| meta.is_dir() && p.contains(Permissions::CREATE)))
    }

    async fn is_deletable(&self, path: &TreePath) -> StorageResult<bool> {
        Ok(self
            .permissions(path)
            .await?
            .is_some_and(|(_, p)| p.contains(Permissions::DELETE)))
    }

    fn verify_path_name(&self, _dir: &TreePath, name: &str) -> StorageResult<()> {
        validation::verify_name(name, self.max_name_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMountRegistry, MemoryStorage};
    use crate::types::MountOptions;
    use bytes::Bytes;

    struct Fixture {
        view: MountedView,
        registry: Arc<MemoryMountRegistry>,
        home: Arc<MemoryStorage>,
        share: Arc<MemoryStorage>,
    }

    /// `alice` is backed by `home`, `alice/files/share` by a movable `share`.
    async fn fixture() -> Fixture {
        let registry = Arc::new(MemoryMountRegistry::new());
        let root = Arc::new(MemoryStorage::new("root"));
        let home = Arc::new(MemoryStorage::new("home"));
        let share = Arc::new(MemoryStorage::new("share"));

        home.seed_file("files/docs/a.txt", "alpha");
        home.seed_dir("files/share");
        home.seed_dir("files/archive");
        share.seed_file("shared.txt", "shared");

        registry.mount("", root.clone(), MountOptions::new()).await;
        registry.mount("alice", home.clone(), MountOptions::new()).await;
        registry
            .mount("alice/files/share", share.clone(), MountOptions::new().movable())
            .await;

        let view = MountedView::new("alice/files", registry.clone());
        Fixture {
            view,
            registry,
            home,
            share,
        }
    }

    fn p(path: &str) -> TreePath {
        TreePath::from(path)
    }

    #[tokio::test]
    async fn test_file_info_routes_to_owning_mount() {
        let fx = fixture().await;

        let info = fx.view.file_info(&p("docs/a.txt")).await.unwrap().unwrap();
        assert_eq!(info.absolute_path.as_str(), "alice/files/docs/a.txt");
        assert_eq!(info.internal_path, "files/docs/a.txt");
        assert_eq!(info.storage.id(), "home");

        let info = fx.view.file_info(&p("share/shared.txt")).await.unwrap().unwrap();
        assert_eq!(info.storage.id(), "share");
        assert_eq!(info.internal_path, "shared.txt");
        assert_eq!(info.mount_point.as_str(), "alice/files/share");

        assert!(fx.view.file_info(&p("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_directory_includes_mounts() {
        let fx = fixture().await;
        fx.registry
            .mount("alice/files/external", Arc::new(MemoryStorage::new("ext")), MountOptions::new())
            .await;

        let names: Vec<String> = fx
            .view
            .list_directory(&TreePath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.path.name().to_string())
            .collect();
        assert_eq!(names, vec!["archive", "docs", "external", "share"]);
    }

    #[tokio::test]
    async fn test_permissions() {
        let fx = fixture().await;
        fx.home
            .set_permissions("files/docs/a.txt", Permissions::READ)
            .unwrap();

        assert!(!fx.view.is_updatable(&p("docs/a.txt")).await.unwrap());
        assert!(!fx.view.is_deletable(&p("docs/a.txt")).await.unwrap());
        assert!(!fx.view.is_creatable(&p("docs/a.txt")).await.unwrap());
        assert!(fx.view.is_creatable(&p("docs")).await.unwrap());
        assert!(!fx.view.is_creatable(&p("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_only_and_fixed_mounts() {
        let fx = fixture().await;
        let ro = Arc::new(MemoryStorage::new("ro"));
        ro.seed_file("f.txt", "x");
        fx.registry
            .mount("alice/files/ro", ro, MountOptions::new().read_only())
            .await;

        assert!(!fx.view.is_updatable(&p("ro/f.txt")).await.unwrap());
        assert!(!fx.view.is_creatable(&p("ro")).await.unwrap());
        // a fixed mount point keeps CREATE for its contents but cannot be renamed
        let fixed = Arc::new(MemoryStorage::new("fixed"));
        fx.registry
            .mount("alice/files/fixed", fixed, MountOptions::new())
            .await;
        assert!(!fx.view.is_updatable(&p("fixed")).await.unwrap());
        assert!(fx.view.is_creatable(&p("fixed")).await.unwrap());
        // movable mount roots keep their storage bits
        assert!(fx.view.is_updatable(&p("share")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_within_storage() {
        let fx = fixture().await;
        assert!(fx.view.rename(&p("docs/a.txt"), &p("archive/a.txt")).await.unwrap());
        assert!(fx.home.contains("files/archive/a.txt"));
        assert!(!fx.home.contains("files/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_rename_across_storages() {
        let fx = fixture().await;
        assert!(fx.view.rename(&p("docs"), &p("share/docs")).await.unwrap());

        assert!(!fx.home.contains("files/docs"));
        assert_eq!(
            fx.share.read("docs/a.txt").await.unwrap(),
            Bytes::from("alpha")
        );
    }

    #[tokio::test]
    async fn test_rename_across_storages_replaces_file() {
        let fx = fixture().await;
        fx.share.seed_file("a.txt", "old");

        assert!(fx.view.rename(&p("docs/a.txt"), &p("share/a.txt")).await.unwrap());

        assert_eq!(fx.share.read("a.txt").await.unwrap(), Bytes::from("alpha"));
        assert_eq!(
            fx.share.list("").await.unwrap(),
            vec!["a.txt".to_string(), "shared.txt".to_string()]
        );
        assert!(!fx.home.contains("files/docs/a.txt"));
    }

    #[test]
    fn test_staging_path_is_a_hidden_sibling() {
        let staged = staging_path("files/docs/a.txt");
        assert!(staged.starts_with("files/docs/.a.txt."));
        assert!(staged.ends_with(".moving"));
        assert_ne!(staged, staging_path("files/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_rename_movable_mount_root_relocates() {
        let fx = fixture().await;
        assert!(fx.view.rename(&p("share"), &p("archive/share")).await.unwrap());

        let info = fx
            .view
            .file_info(&p("archive/share/shared.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.storage.id(), "share");
        // the old mount point now falls through to the shadowed directory
        let old = fx.view.file_info(&p("share")).await.unwrap().unwrap();
        assert_eq!(old.storage.id(), "home");
    }

    #[tokio::test]
    async fn test_rename_carries_nested_movable_mounts() {
        let fx = fixture().await;
        fx.home.seed_dir("files/outer");
        fx.registry
            .mount(
                "alice/files/outer/inner",
                Arc::new(MemoryStorage::new("inner")),
                MountOptions::new().movable(),
            )
            .await;

        assert!(fx.view.rename(&p("outer"), &p("archive/outer")).await.unwrap());
        let info = fx
            .view
            .file_info(&p("archive/outer/inner"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.storage.id(), "inner");
    }

    #[tokio::test]
    async fn test_rename_refuses_to_strand_fixed_mounts() {
        let fx = fixture().await;
        fx.home.seed_dir("files/outer");
        fx.registry
            .mount(
                "alice/files/outer/fixed",
                Arc::new(MemoryStorage::new("fixed")),
                MountOptions::new(),
            )
            .await;

        assert!(!fx.view.rename(&p("outer"), &p("archive/outer")).await.unwrap());
        assert!(fx.home.contains("files/outer"));
    }

    #[tokio::test]
    async fn test_rename_unavailable_backend() {
        let fx = fixture().await;
        fx.home.set_available(false);
        let result = fx.view.rename(&p("docs/a.txt"), &p("archive/a.txt")).await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_copy_replaces_target() {
        let fx = fixture().await;
        fx.home.seed_file("files/archive/old.txt", "old");
        fx.home.seed_file("files/docs/b.txt", "beta");

        fx.view.copy(&p("docs"), &p("archive")).await.unwrap();

        assert!(!fx.home.contains("files/archive/old.txt"));
        let src = fx.view.file_info(&p("docs")).await.unwrap().unwrap();
        let dst = fx.view.file_info(&p("archive")).await.unwrap().unwrap();
        assert_eq!(src.metadata.etag, dst.metadata.etag);
        assert_eq!(src.metadata.size, dst.metadata.size);
    }

    #[tokio::test]
    async fn test_copy_across_mounts() {
        let fx = fixture().await;
        fx.view.copy(&p("share"), &p("archive/share-copy")).await.unwrap();

        assert_eq!(
            fx.home.read("files/archive/share-copy/shared.txt").await.unwrap(),
            Bytes::from("shared")
        );
        assert!(fx.share.contains("shared.txt"));
    }

    #[tokio::test]
    async fn test_copy_into_itself_is_denied() {
        let fx = fixture().await;
        let result = fx.view.copy(&p("docs"), &p("docs/inner")).await;
        assert!(matches!(result, Err(StorageError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_verify_path_name() {
        let fx = fixture().await;
        let view = MountedView::new("alice/files", fx.registry.clone()).with_max_name_length(8);

        assert!(view.verify_path_name(&TreePath::root(), "ok.txt").is_ok());
        assert!(matches!(
            view.verify_path_name(&TreePath::root(), "too-long.txt"),
            Err(StorageError::InvalidPathName { .. })
        ));
        assert!(matches!(
            fx.view.verify_path_name(&TreePath::root(), "bad|name"),
            Err(StorageError::InvalidPathName { .. })
        ));
    }
}
