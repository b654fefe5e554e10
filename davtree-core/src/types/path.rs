use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized logical path inside the unified tree.
///
/// The root of the tree is the empty path. Normalized paths never carry a
/// leading or trailing separator and never contain empty segments, so two
/// paths are equal exactly when their normalized forms are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TreePath {
    inner: String,
}

impl TreePath {
    /// Creates a new TreePath, normalizing the given string.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            inner: Self::normalize(path.as_ref()),
        }
    }

    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Removes leading/trailing separators and collapses repeated ones.
    fn normalize(path: &str) -> String {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Returns true for the empty (root) path.
    pub fn is_root(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the normalized string form.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Splits the path into its parent directory and leaf name.
    ///
    /// Top-level entries have the root as their parent. The root itself
    /// splits into `(root, "")`.
    pub fn split(&self) -> (TreePath, &str) {
        match self.inner.rfind('/') {
            Some(idx) => (
                TreePath {
                    inner: self.inner[..idx].to_string(),
                },
                &self.inner[idx + 1..],
            ),
            None => (TreePath::root(), self.inner.as_str()),
        }
    }

    /// Returns the parent directory of this path.
    pub fn parent(&self) -> TreePath {
        self.split().0
    }

    /// Returns the final component, or an empty string for the root.
    pub fn name(&self) -> &str {
        self.split().1
    }

    /// Returns the extension of the final component, if any.
    ///
    /// Dot-files such as `.hidden` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Appends a relative path to this one.
    pub fn join(&self, child: impl AsRef<str>) -> TreePath {
        let child = Self::normalize(child.as_ref());
        if self.is_root() {
            TreePath { inner: child }
        } else if child.is_empty() {
            self.clone()
        } else {
            TreePath {
                inner: format!("{}/{}", self.inner, child),
            }
        }
    }

    /// Returns true if `self` equals `base` or lies underneath it.
    ///
    /// Every path lies underneath the root.
    pub fn starts_with(&self, base: &TreePath) -> bool {
        base.is_root()
            || self.inner == base.inner
            || (self.inner.starts_with(&base.inner)
                && self.inner.as_bytes().get(base.inner.len()) == Some(&b'/'))
    }

    /// Strips `base` from the front of this path.
    ///
    /// Returns `None` if the path does not lie underneath `base`; returns the
    /// root when the paths are equal.
    pub fn strip_prefix(&self, base: &TreePath) -> Option<TreePath> {
        if !self.starts_with(base) {
            return None;
        }
        if base.is_root() {
            return Some(self.clone());
        }
        let rest = self.inner[base.inner.len()..].trim_start_matches('/');
        Some(TreePath {
            inner: rest.to_string(),
        })
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.inner)
    }
}

impl From<&str> for TreePath {
    fn from(s: &str) -> Self {
        TreePath::new(s)
    }
}

impl From<String> for TreePath {
    fn from(s: String) -> Self {
        TreePath::new(s)
    }
}

impl From<&TreePath> for TreePath {
    fn from(p: &TreePath) -> Self {
        p.clone()
    }
}

impl From<TreePath> for String {
    fn from(p: TreePath) -> Self {
        p.inner
    }
}

impl AsRef<str> for TreePath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}
