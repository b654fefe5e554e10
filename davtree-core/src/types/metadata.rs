use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Represents the type of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    #[serde(alias = "dir")]
    Directory,
}

impl FileType {
    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "dir"),
        }
    }
}

/// Permission bits attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    /// Entry can be read
    pub const READ: Self = Self(1 << 0);
    /// Entry content or name can be changed
    pub const UPDATE: Self = Self(1 << 1);
    /// Children can be created inside the entry
    pub const CREATE: Self = Self(1 << 2);
    /// Entry can be removed from its parent
    pub const DELETE: Self = Self(1 << 3);
    /// Entry can be shared
    pub const SHARE: Self = Self(1 << 4);

    /// Creates an empty set of permissions.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates a set containing every permission.
    pub const fn all() -> Self {
        Self(Self::READ.0 | Self::UPDATE.0 | Self::CREATE.0 | Self::DELETE.0 | Self::SHARE.0)
    }

    /// Returns the raw value of the bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Creates permissions from raw bits, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    /// Returns true if all bits in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the bits of `self` not present in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Inserts the specified bits.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Removes the specified bits.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::Sub for Permissions {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (Self::READ, 'r'),
            (Self::UPDATE, 'u'),
            (Self::CREATE, 'c'),
            (Self::DELETE, 'd'),
            (Self::SHARE, 's'),
        ];
        for (flag, c) in flags {
            write!(f, "{}", if self.contains(flag) { c } else { '-' })?;
        }
        Ok(())
    }
}

/// Metadata snapshot for a tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Type of the entry
    pub file_type: FileType,
    /// Size in bytes (recursive size for directories)
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Permission bits
    pub permissions: Permissions,
    /// Opaque version tag that changes whenever content changes
    pub etag: String,
    /// Identifier of the storage holding the entry
    pub storage_id: String,
}

impl Metadata {
    /// Creates metadata for a file.
    pub fn file(storage_id: impl Into<String>, size: u64, etag: impl Into<String>) -> Self {
        Self {
            file_type: FileType::File,
            size,
            modified: SystemTime::now(),
            permissions: Permissions::all(),
            etag: etag.into(),
            storage_id: storage_id.into(),
        }
    }

    /// Creates metadata for a directory.
    pub fn directory(storage_id: impl Into<String>) -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
            modified: SystemTime::now(),
            permissions: Permissions::all(),
            etag: String::new(),
            storage_id: storage_id.into(),
        }
    }

    /// Replaces the permission bits.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }

    /// Returns true if this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bits() {
        let perms = Permissions::READ | Permissions::UPDATE;
        assert!(perms.contains(Permissions::READ));
        assert!(perms.contains(Permissions::UPDATE));
        assert!(!perms.contains(Permissions::DELETE));
        assert_eq!(perms.bits(), 0b11);

        let without_delete = Permissions::all() - Permissions::DELETE;
        assert!(!without_delete.contains(Permissions::DELETE));
        assert!(without_delete.contains(Permissions::CREATE));
    }

    #[test]
    fn test_permission_insert_remove() {
        let mut perms = Permissions::empty();
        perms.insert(Permissions::CREATE);
        assert!(perms.contains(Permissions::CREATE));
        perms.remove(Permissions::CREATE);
        assert_eq!(perms, Permissions::empty());
        assert_eq!(Permissions::from_bits_truncate(0xff), Permissions::all());
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permissions::all().to_string(), "rucds");
        assert_eq!(Permissions::READ.to_string(), "r----");
    }

    #[test]
    fn test_file_type_serde() {
        assert_eq!(serde_json::to_string(&FileType::Directory).unwrap(), "\"directory\"");
        let parsed: FileType = serde_json::from_str("\"dir\"").unwrap();
        assert_eq!(parsed, FileType::Directory);
        assert_eq!(FileType::Directory.to_string(), "dir");
    }

    #[test]
    fn test_metadata_constructors() {
        let file = Metadata::file("home", 12, "abc");
        assert!(file.is_file());
        assert_eq!(file.size, 12);
        assert_eq!(file.storage_id, "home");

        let dir = Metadata::directory("home").with_permissions(Permissions::READ);
        assert!(dir.is_dir());
        assert_eq!(dir.permissions, Permissions::READ);
    }
}
