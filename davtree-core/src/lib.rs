//! # davtree Core
//!
//! Node resolution and cross-mount move/copy for a unified file namespace.
//!
//! ## Overview
//!
//! davtree presents several independently mounted storages as one tree of
//! paths. A file-protocol server hands it paths; davtree finds the storage
//! that owns each path, turns it into a [`Node`], and carries out moves and
//! copies that may cross mount boundaries. It is meant to be used for:
//!
//! - Resolving paths with a per-request cache
//! - Mapping chunked-upload piece names to their logical file
//! - Moving and copying between storages, including relocating movable mounts
//!
//! ## Basic Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use davtree_core::{MemoryMountRegistry, MemoryStorage, MountOptions, MountedView, NodeTree, RequestContext};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MemoryMountRegistry::new());
//!     registry.mount("", Arc::new(MemoryStorage::new("home")), MountOptions::new()).await;
//!
//!     let view = Arc::new(MountedView::new("", registry));
//!     let mut tree = NodeTree::new(RequestContext::new());
//!     tree.init(NodeTree::load_root(view.as_ref()).await?, view);
//!
//!     tree.move_node("docs/a.txt", "archive/a.txt").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`traits`]: contracts of storages, mount registries and path views
//! - [`tree`]: the request-scoped node tree
//! - [`view`]: a path view routing through a mount registry
//! - [`memory`]: in-memory storage and mount registry
//! - [`chunking`]: chunked-upload names
//! - [`validation`]: naming rules
//! - [`snapshot`]: JSON snapshots of a namespace
//! - [`error`]: error types
//! - [`stats`]: usage statistics

pub mod chunking;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod stats;
pub mod traits;
pub mod tree;
pub mod types;
pub mod validation;
pub mod view;

pub use error::{StorageError, StorageResult, TreeError, TreeResult};
pub use memory::{MemoryMountRegistry, MemoryStorage};
pub use snapshot::{LoadedTree, SnapshotError, TreeSnapshot};
pub use stats::{TreeOperation, TreeStats};
pub use traits::{MountRegistry, PathView, Storage};
pub use tree::NodeTree;
pub use types::{
    ConfigError, FileInfo, FileType, LogLevel, Metadata, Mount, MountOptions, MountRecord, Node, Permissions,
    RequestContext, TreeConfig, TreePath,
};
pub use view::MountedView;
