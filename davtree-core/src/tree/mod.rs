//! Node resolution and cross-mount move/copy.
//!
//! A [`NodeTree`] lives for exactly one request. It resolves paths to
//! [`Node`]s through a [`PathView`], memoizes every resolution, and
//! orchestrates moves and copies, dropping cached nodes whenever a mutation
//! changes a directory listing.
//!
//! Backend failures never leave this module as [`StorageError`]s; they are
//! mapped onto the [`TreeError`] kinds the protocol layer understands.

mod cache;


use std::sync::Arc;

use tracing::{debug, info, warn};

pub use cache::NodeCache;

use crate::chunking;
use crate::error::{StorageError, TreeError, TreeResult};
use crate::stats::{TreeOperation, TreeStats};
use crate::traits::PathView;
use crate::types::{FileInfo, Node, RequestContext, TreeConfig, TreePath, DEFAULT_PART_EXTENSION};

/// Maps a backend failure during resolution.
fn resolve_error(path: &TreePath, err: StorageError) -> TreeError {
    match err {
        StorageError::Unavailable { storage, reason } => {
            warn!(path = %path, storage = %storage, "storage unavailable during resolution");
            TreeError::unavailable(format!("storage {storage} not available: {reason}"))
        }
        StorageError::Invalid { storage } => {
            warn!(path = %path, storage = %storage, "storage invalid");
            TreeError::not_found(path, format!("storage {storage} is invalid"))
        }
        StorageError::NotFound { .. } | StorageError::NoMount { .. } => {
            TreeError::not_found(path, err.to_string())
        }
        other => TreeError::unavailable(other.to_string()),
    }
}

/// Maps a backend failure during a move or copy.
fn mutation_error(path: &TreePath, err: StorageError) -> TreeError {
    match err {
        StorageError::Unavailable { storage, reason } => {
            warn!(path = %path, storage = %storage, "storage unavailable during mutation");
            TreeError::unavailable(format!("storage {storage} not available: {reason}"))
        }
        StorageError::InvalidPathName { name, reason } => TreeError::InvalidPathName { name, reason },
        StorageError::Invalid { .. } | StorageError::NotFound { .. } => {
            TreeError::not_found(path, err.to_string())
        }
        other => TreeError::forbidden(other.to_string()),
    }
}

/// Root node and view, present once the tree is initialized.
struct Backing {
    root: Node,
    view: Arc<dyn PathView>,
}

/// Request-scoped tree of nodes over a path view.
pub struct NodeTree {
    context: RequestContext,
    part_extension: String,
    backing: Option<Backing>,
    cache: NodeCache,
    stats: Arc<TreeStats>,
}

impl std::fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("context", &self.context)
            .field("part_extension", &self.part_extension)
            .field("initialized", &self.backing.is_some())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl NodeTree {
    /// Creates an uninitialized tree for one request.
    ///
    /// Every operation fails with `ServiceUnavailable` until [`init`] is
    /// called.
    ///
    /// [`init`]: NodeTree::init
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            part_extension: DEFAULT_PART_EXTENSION.to_string(),
            backing: None,
            cache: NodeCache::new(),
            stats: Arc::new(TreeStats::new()),
        }
    }

    /// Applies the tree related settings of `config`.
    pub fn with_config(mut self, config: &TreeConfig) -> Self {
        self.part_extension = config.part_extension.clone();
        self
    }

    /// Sets the extension marking in-flight upload parts.
    pub fn with_part_extension(mut self, extension: impl Into<String>) -> Self {
        self.part_extension = extension.into();
        self
    }

    /// Shares statistics with other trees.
    pub fn with_stats(mut self, stats: Arc<TreeStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Wires the root node and the view.
    pub fn init(&mut self, root: Node, view: Arc<dyn PathView>) {
        debug!(request = %self.context.request_id, "node tree initialized");
        self.cache.clear();
        self.backing = Some(Backing { root, view });
    }

    /// Resolves the root of `view` into a node suitable for [`init`].
    ///
    /// [`init`]: NodeTree::init
    pub async fn load_root(view: &dyn PathView) -> TreeResult<Node> {
        let root = TreePath::root();
        let info = view
            .file_info(&root)
            .await
            .map_err(|err| resolve_error(&root, err))?
            .ok_or_else(|| TreeError::not_found(&root, "view root does not exist"))?;
        if !info.metadata.is_dir() {
            return Err(TreeError::not_found(&root, "view root is not a directory"));
        }
        Ok(Node::from_info(info))
    }

    pub fn is_initialized(&self) -> bool {
        self.backing.is_some()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn stats(&self) -> &Arc<TreeStats> {
        &self.stats
    }

    /// Returns true if a node for `path` is currently cached.
    pub fn is_cached(&self, path: impl Into<TreePath>) -> bool {
        self.cache.contains(&path.into())
    }

    fn backing(&self) -> TreeResult<(Node, Arc<dyn PathView>)> {
        self.backing
            .as_ref()
            .map(|backing| (backing.root.clone(), Arc::clone(&backing.view)))
            .ok_or_else(|| TreeError::unavailable("filesystem not set up"))
    }

    /// Rewrites a chunk path to its logical file when this request is a
    /// chunked upload.
    pub fn resolve_chunk_name(&self, path: &TreePath) -> TreePath {
        chunking::resolve_chunk_name(path, self.context.chunked_upload)
    }

    fn is_part_file(&self, path: &TreePath) -> bool {
        path.extension() == Some(self.part_extension.as_str())
    }

    /// Resolves `path` to a node.
    pub async fn resolve(&mut self, path: impl Into<TreePath>) -> TreeResult<Node> {
        let path = path.into();
        let result = self.lookup(&path).await;
        self.stats.record(TreeOperation::Resolve, result.is_ok());
        result
    }

    /// Returns whether a node exists at `path`.
    ///
    /// Only `NotFound` turns into `false`; other failures propagate.
    pub async fn node_exists(&mut self, path: impl Into<TreePath>) -> TreeResult<bool> {
        match self.resolve(path).await {
            Ok(_) => Ok(true),
            Err(TreeError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn lookup(&mut self, path: &TreePath) -> TreeResult<Node> {
        let (root, view) = self.backing()?;
        if path.is_root() {
            return Ok(root);
        }
        if let Some(node) = self.cache.get(path) {
            self.stats.increment_cache_hits();
            return Ok(node.clone());
        }

        let (key, info) = if self.is_part_file(path) {
            (path.clone(), self.scan_part(view.as_ref(), path).await?)
        } else {
            let logical = self.resolve_chunk_name(path);
            if let Some(node) = self.cache.get(&logical) {
                self.stats.increment_cache_hits();
                return Ok(node.clone());
            }
            self.stats.increment_index_lookups();
            let info = view
                .file_info(&logical)
                .await
                .map_err(|err| resolve_error(&logical, err))?;
            (logical, info)
        };
        self.stats.increment_cache_misses();

        let info = info.ok_or_else(|| TreeError::not_found(&key, "no such file or directory"))?;
        let node = Node::from_info(info);
        debug!(
            request = %self.context.request_id,
            path = %key,
            kind = %node.kind(),
            "resolved node"
        );
        self.cache.insert(key, node.clone());
        Ok(node)
    }

    /// Reads metadata of an in-flight upload part straight from its storage.
    async fn scan_part(&self, view: &dyn PathView, path: &TreePath) -> TreeResult<Option<FileInfo>> {
        let mount = view
            .mount_for(path)
            .await
            .map_err(|err| resolve_error(path, err))?;
        let absolute = view.absolute_path(path);
        let internal = mount
            .internal_path(&absolute)
            .ok_or_else(|| TreeError::not_found(path, "path lies outside its mount"))?;

        self.stats.increment_live_scans();
        let metadata = mount
            .storage()
            .scan(&internal)
            .await
            .map_err(|err| resolve_error(path, err))?;

        Ok(metadata.map(|metadata| FileInfo {
            path: path.clone(),
            absolute_path: absolute,
            mount_point: mount.mount_point().clone(),
            storage: Arc::clone(mount.storage()),
            internal_path: internal,
            metadata,
        }))
    }

    /// Lists the directory at `path`, caching every child.
    pub async fn children(&mut self, path: impl Into<TreePath>) -> TreeResult<Vec<Node>> {
        let path = path.into();
        let result = self.list_children(&path).await;
        self.stats.record(TreeOperation::Children, result.is_ok());
        result
    }

    async fn list_children(&mut self, path: &TreePath) -> TreeResult<Vec<Node>> {
        let (_, view) = self.backing()?;
        let node = self.lookup(path).await?;
        if !node.is_directory() {
            return Err(TreeError::forbidden(format!("{} is not a collection", node.path())));
        }

        let entries = view
            .list_directory(node.path())
            .await
            .map_err(|err| resolve_error(node.path(), err))?;
        let mut children = Vec::with_capacity(entries.len());
        for info in entries {
            let key = info.path.clone();
            let child = Node::from_info(info);
            self.cache.insert(key, child.clone());
            children.push(child);
        }
        Ok(children)
    }

    /// Moves or renames `source` to `destination`.
    pub async fn move_node(
        &mut self,
        source: impl Into<TreePath>,
        destination: impl Into<TreePath>,
    ) -> TreeResult<()> {
        let source = source.into();
        let destination = destination.into();
        let result = self.do_move(&source, &destination).await;
        self.stats.record(TreeOperation::Move, result.is_ok());
        result
    }

    async fn do_move(&mut self, source: &TreePath, destination: &TreePath) -> TreeResult<()> {
        let (_, view) = self.backing()?;
        // Resolution only proves the source exists; chunk names are moved
        // under the name the client sent.
        let source_node = self.lookup(source).await?;

        if source_node.is_directory() && self.exists(destination).await? {
            return Err(TreeError::forbidden(format!(
                "could not move {source} to {destination}: target exists"
            )));
        }

        let (source_dir, _) = source.split();
        let (destination_dir, destination_name) = destination.split();

        let mount = view
            .mount_for(source)
            .await
            .map_err(|err| mutation_error(source, err))?;
        let relocation = mount.is_movable()
            && mount
                .internal_path(&view.absolute_path(source))
                .is_some_and(|internal| internal.is_empty());

        if !relocation && !Self::check(view.is_updatable(source).await, source)? {
            return Err(TreeError::forbidden(format!("{source} cannot be renamed")));
        }
        if source_dir != destination_dir {
            if !Self::check(view.is_creatable(&destination_dir).await, &destination_dir)? {
                return Err(TreeError::forbidden(format!(
                    "cannot create entries in {destination_dir}"
                )));
            }
            if !relocation && !Self::check(view.is_deletable(source).await, source)? {
                return Err(TreeError::forbidden(format!("{source} cannot be removed")));
            }
        }

        view.verify_path_name(&destination_dir, destination_name)
            .map_err(|err| mutation_error(destination, err))?;

        let renamed = view
            .rename(source, destination)
            .await
            .map_err(|err| mutation_error(source, err))?;
        if !renamed {
            return Err(TreeError::forbidden(format!(
                "could not move {source} to {destination}"
            )));
        }

        self.mark_dirty(&source_dir);
        self.mark_dirty(&destination_dir);
        info!(
            request = %self.context.request_id,
            source = %source,
            destination = %destination,
            relocation,
            "moved node"
        );
        Ok(())
    }

    /// Copies `source` to `destination`, replacing any existing node there.
    pub async fn copy_node(
        &mut self,
        source: impl Into<TreePath>,
        destination: impl Into<TreePath>,
    ) -> TreeResult<()> {
        let source = source.into();
        let destination = destination.into();
        let result = self.do_copy(&source, &destination).await;
        self.stats.record(TreeOperation::Copy, result.is_ok());
        result
    }

    async fn do_copy(&mut self, source: &TreePath, destination: &TreePath) -> TreeResult<()> {
        let (_, view) = self.backing()?;
        self.lookup(source).await?;

        let (destination_dir, destination_name) = destination.split();
        view.verify_path_name(&destination_dir, destination_name)
            .map_err(|err| mutation_error(destination, err))?;

        // The view may already have replaced the destination when the copy
        // fails, so the listing is stale either way.
        let copied = view.copy(source, destination).await;
        self.mark_dirty(&destination_dir);
        copied.map_err(|err| mutation_error(destination, err))?;

        info!(
            request = %self.context.request_id,
            source = %source,
            destination = %destination,
            "copied node"
        );
        Ok(())
    }

    /// Drops cached nodes at and beneath `path`.
    pub fn mark_dirty(&mut self, path: &TreePath) {
        let dropped = self.cache.invalidate(path);
        if dropped > 0 {
            debug!(path = %path, dropped, "invalidated cached nodes");
            self.stats.add_invalidated(dropped as u64);
        }
    }

    async fn exists(&mut self, path: &TreePath) -> TreeResult<bool> {
        match self.lookup(path).await {
            Ok(_) => Ok(true),
            Err(TreeError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn check(result: Result<bool, StorageError>, path: &TreePath) -> TreeResult<bool> {
        result.map_err(|err| mutation_error(path, err))
    }
}
