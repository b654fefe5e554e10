use std::fmt;
use std::sync::Arc;

use crate::traits::Storage;
use crate::types::{FileType, Metadata, TreePath};

/// Everything known about one entry: where it lives and what it looks like.
#[derive(Clone)]
pub struct FileInfo {
    /// Path relative to the view root
    pub path: TreePath,
    /// Absolute path in the mount namespace
    pub absolute_path: TreePath,
    /// Mount point of the owning mount
    pub mount_point: TreePath,
    /// Storage holding the entry
    pub storage: Arc<dyn Storage>,
    /// Path of the entry inside its storage
    pub internal_path: String,
    /// Metadata snapshot
    pub metadata: Metadata,
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("path", &self.path)
            .field("absolute_path", &self.absolute_path)
            .field("mount_point", &self.mount_point)
            .field("storage", &self.storage.id())
            .field("internal_path", &self.internal_path)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A resolved entry of the tree.
///
/// Nodes are immutable snapshots. Clones share the same payload, so two
/// clones of one resolution compare equal under [`Node::same_node`].
#[derive(Debug, Clone)]
pub enum Node {
    File(Arc<FileInfo>),
    Directory(Arc<FileInfo>),
}

impl Node {
    /// Wraps `info` in the variant matching its type tag.
    pub fn from_info(info: FileInfo) -> Self {
        match info.metadata.file_type {
            FileType::File => Node::File(Arc::new(info)),
            FileType::Directory => Node::Directory(Arc::new(info)),
        }
    }

    /// Shared payload of the node.
    pub fn info(&self) -> &FileInfo {
        match self {
            Node::File(info) | Node::Directory(info) => info,
        }
    }

    pub fn path(&self) -> &TreePath {
        &self.info().path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.info().metadata
    }

    pub fn kind(&self) -> FileType {
        match self {
            Node::File(_) => FileType::File,
            Node::Directory(_) => FileType::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    /// Returns true if both handles point at the same resolution.
    pub fn same_node(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::File(a), Node::File(b)) | (Node::Directory(a), Node::Directory(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}
