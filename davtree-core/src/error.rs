//! Error types for the davtree system.
//!
//! Two layers of errors exist. [`StorageError`] is what storages, mount
//! registries and path views report. [`TreeError`] is the small taxonomy the
//! node tree hands to the protocol layer; storage errors never cross the tree
//! boundary without being mapped onto it.

use crate::types::TreePath;
use thiserror::Error;

/// Errors surfaced by the node tree to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// No node exists at the path, or its storage is invalid.
    #[error("Not found: {path} ({reason})")]
    NotFound {
        path: TreePath,
        reason: String,
    },

    /// The tree is not initialized or a backend is unavailable.
    #[error("Service unavailable: {reason}")]
    ServiceUnavailable {
        reason: String,
    },

    /// A permission, conflict or ambiguous rename failure.
    #[error("Forbidden: {reason}")]
    Forbidden {
        reason: String,
    },

    /// The destination name violates the naming rules.
    #[error("Invalid path name '{name}': {reason}")]
    InvalidPathName {
        name: String,
        reason: String,
    },
}

impl TreeError {
    pub(crate) fn not_found(path: &TreePath, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Protocol status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            TreeError::NotFound { .. } => 404,
            TreeError::ServiceUnavailable { .. } => 503,
            TreeError::Forbidden { .. } => 403,
            TreeError::InvalidPathName { .. } => 400,
        }
    }
}

/// Result type alias for node tree operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;

/// Errors reported by storages, mount registries and path views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The storage cannot be reached right now.
    #[error("Storage {storage} not available: {reason}")]
    Unavailable {
        storage: String,
        reason: String,
    },

    /// The storage's metadata index is corrupt or the storage is gone.
    #[error("Storage {storage} is invalid")]
    Invalid {
        storage: String,
    },

    /// A name failed the naming rules.
    #[error("Invalid path name '{name}': {reason}")]
    InvalidPathName {
        name: String,
        reason: String,
    },

    /// No entry at the internal path.
    #[error("Path not found: {path}")]
    NotFound {
        path: String,
    },

    /// An entry already exists at the internal path.
    #[error("Path already exists: {path}")]
    AlreadyExists {
        path: String,
    },

    /// The operation needs a directory but found a file.
    #[error("Not a directory: {path}")]
    NotADirectory {
        path: String,
    },

    /// The caller lacks the permission for the operation.
    #[error("Permission denied for operation '{operation}' on path: {path}")]
    PermissionDenied {
        path: String,
        operation: String,
    },

    /// No mount covers the path.
    #[error("No mount point for path: {path}")]
    NoMount {
        path: String,
    },
}

/// Result type alias for storage level operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::not_found(&TreePath::from("a/b.txt"), "no metadata");
        assert_eq!(err.to_string(), "Not found: /a/b.txt (no metadata)");

        let err = TreeError::unavailable("filesystem not setup");
        assert_eq!(err.to_string(), "Service unavailable: filesystem not setup");

        let err = TreeError::InvalidPathName {
            name: "a:b".to_string(),
            reason: "contains invalid character ':'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid path name 'a:b': contains invalid character ':'"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TreeError::not_found(&TreePath::root(), "").status_code(), 404);
        assert_eq!(TreeError::unavailable("").status_code(), 503);
        assert_eq!(TreeError::forbidden("").status_code(), 403);
        let invalid = TreeError::InvalidPathName {
            name: String::new(),
            reason: String::new(),
        };
        assert_eq!(invalid.status_code(), 400);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Unavailable {
            storage: "smb::share".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Storage smb::share not available: connection refused"
        );

        let err = StorageError::PermissionDenied {
            path: "docs".to_string(),
            operation: "copy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Permission denied for operation 'copy' on path: docs"
        );
    }
}
