//! Request-scoped resolution cache.

use std::collections::HashMap;

use crate::types::{Node, TreePath};

/// Resolved nodes keyed by their normalized path.
///
/// Entries never expire on their own. Invalidating a path drops it together
/// with everything cached beneath it.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<TreePath, Node>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &TreePath) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn insert(&mut self, path: TreePath, node: Node) {
        self.nodes.insert(path, node);
    }

    pub fn contains(&self, path: &TreePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops `path` and every cached path beneath it.
    ///
    /// Returns the number of dropped entries. Invalidating the root empties
    /// the cache.
    pub fn invalidate(&mut self, path: &TreePath) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|cached, _| !cached.starts_with(path));
        before - self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
