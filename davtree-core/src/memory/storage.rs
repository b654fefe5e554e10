//! In-memory storage backend.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::traits::Storage;
use crate::types::{FileType, Metadata, Permissions, TreePath};

#[derive(Debug, Clone)]
struct MemoryEntry {
    file_type: FileType,
    data: Bytes,
    etag: String,
    modified: SystemTime,
    permissions: Permissions,
    /// Known to the persistent index. Upload parts are written unindexed.
    indexed: bool,
}

impl MemoryEntry {
    fn directory() -> Self {
        Self {
            file_type: FileType::Directory,
            data: Bytes::new(),
            etag: String::new(),
            modified: SystemTime::now(),
            permissions: Permissions::all(),
            indexed: true,
        }
    }

    fn file(data: Bytes, indexed: bool) -> Self {
        Self {
            file_type: FileType::File,
            etag: content_etag(&data),
            data,
            modified: SystemTime::now(),
            permissions: Permissions::all(),
            indexed,
        }
    }
}

fn content_etag(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// A raw entry as seen by snapshot tooling.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub path: String,
    pub file_type: FileType,
    pub data: Bytes,
    pub permissions: Permissions,
    pub indexed: bool,
}

/// Number of backend calls a [`MemoryStorage`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageCalls {
    pub metadata: u64,
    pub scan: u64,
    pub list: u64,
    pub write: u64,
    pub remove: u64,
    pub rename: u64,
    pub copy: u64,
}

#[derive(Debug, Default)]
struct CallCounters {
    metadata: AtomicU64,
    scan: AtomicU64,
    list: AtomicU64,
    write: AtomicU64,
    remove: AtomicU64,
    rename: AtomicU64,
    copy: AtomicU64,
}

/// A storage kept entirely in memory.
///
/// Besides serving as a backend for tests and tooling it can simulate an
/// unreachable backend ([`set_available`](Self::set_available)) and a
/// corrupt metadata index ([`set_invalid`](Self::set_invalid)), and counts
/// every call it serves.
#[derive(Debug)]
pub struct MemoryStorage {
    id: String,
    entries: DashMap<String, MemoryEntry>,
    /// Serializes mutations touching more than one entry.
    write_lock: Mutex<()>,
    available: AtomicBool,
    invalid: AtomicBool,
    calls: CallCounters,
}

impl MemoryStorage {
    /// Creates an empty storage containing only its root directory.
    pub fn new(id: impl Into<String>) -> Self {
        let entries = DashMap::new();
        entries.insert(String::new(), MemoryEntry::directory());
        Self {
            id: id.into(),
            entries,
            write_lock: Mutex::new(()),
            available: AtomicBool::new(true),
            invalid: AtomicBool::new(false),
            calls: CallCounters::default(),
        }
    }

    /// Simulates the backend going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Simulates a corrupt metadata index.
    pub fn set_invalid(&self, invalid: bool) {
        self.invalid.store(invalid, Ordering::SeqCst);
    }

    /// Returns a snapshot of the call counters.
    pub fn calls(&self) -> StorageCalls {
        StorageCalls {
            metadata: self.calls.metadata.load(Ordering::Relaxed),
            scan: self.calls.scan.load(Ordering::Relaxed),
            list: self.calls.list.load(Ordering::Relaxed),
            write: self.calls.write.load(Ordering::Relaxed),
            remove: self.calls.remove.load(Ordering::Relaxed),
            rename: self.calls.rename.load(Ordering::Relaxed),
            copy: self.calls.copy.load(Ordering::Relaxed),
        }
    }

    /// Creates a directory and any missing parents.
    pub fn seed_dir(&self, path: &str) {
        let path = TreePath::from(path);
        let mut current = TreePath::root();
        for segment in path.as_str().split('/').filter(|s| !s.is_empty()) {
            current = current.join(segment);
            self.entries
                .entry(current.as_str().to_string())
                .or_insert_with(MemoryEntry::directory);
        }
    }

    /// Creates or replaces an indexed file, creating missing parents.
    pub fn seed_file(&self, path: &str, data: impl Into<Bytes>) {
        let path = TreePath::from(path);
        self.seed_dir(path.parent().as_str());
        self.entries
            .insert(path.as_str().to_string(), MemoryEntry::file(data.into(), true));
    }

    /// Writes a file the persistent index does not know about yet.
    pub fn seed_part(&self, path: &str, data: impl Into<Bytes>) {
        let path = TreePath::from(path);
        self.seed_dir(path.parent().as_str());
        self.entries
            .insert(path.as_str().to_string(), MemoryEntry::file(data.into(), false));
    }

    /// Replaces the permission bits of an entry.
    pub fn set_permissions(&self, path: &str, permissions: Permissions) -> StorageResult<()> {
        let key = TreePath::from(path).as_str().to_string();
        let mut entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| StorageError::NotFound { path: key.clone() })?;
        entry.permissions = permissions;
        Ok(())
    }

    /// Returns every entry below the root, parents before children.
    pub fn stored_entries(&self) -> Vec<StoredEntry> {
        let mut entries: Vec<StoredEntry> = self
            .entries
            .iter()
            .filter(|e| !e.key().is_empty())
            .map(|e| StoredEntry {
                path: e.key().clone(),
                file_type: e.file_type,
                data: e.data.clone(),
                permissions: e.permissions,
                indexed: e.indexed,
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Returns true when the storage holds any entry at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(TreePath::from(path).as_str())
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable {
                storage: self.id.clone(),
                reason: "storage is offline".to_string(),
            })
        }
    }

    fn key(path: &str) -> String {
        TreePath::from(path).as_str().to_string()
    }

    fn is_within(key: &str, base: &str) -> bool {
        base.is_empty()
            || key == base
            || (key.starts_with(base) && key.as_bytes().get(base.len()) == Some(&b'/'))
    }

    /// Keys of `base` and everything below it, parents first.
    fn subtree_keys(&self, base: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| Self::is_within(e.key(), base))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn require_directory(&self, key: &str) -> StorageResult<()> {
        match self.entries.get(key) {
            Some(entry) if entry.file_type.is_dir() => Ok(()),
            Some(_) => Err(StorageError::NotADirectory {
                path: key.to_string(),
            }),
            None => Err(StorageError::NotFound {
                path: key.to_string(),
            }),
        }
    }

    fn require_parent(&self, key: &str) -> StorageResult<()> {
        self.require_directory(TreePath::from(key).parent().as_str())
    }

    /// Builds the metadata for an entry.
    ///
    /// Directory sizes are recursive and directory etags digest the etags of
    /// everything below, so identical trees report identical metadata.
    fn build_metadata(&self, key: &str, entry: &MemoryEntry, indexed_only: bool) -> Metadata {
        let (size, etag) = match entry.file_type {
            FileType::File => (entry.data.len() as u64, entry.etag.clone()),
            FileType::Directory => {
                let mut hasher = Sha256::new();
                let mut size = 0u64;
                let mut children: Vec<(String, String, u64)> = self
                    .entries
                    .iter()
                    .filter(|e| e.key() != key && Self::is_within(e.key(), key))
                    .filter(|e| e.file_type.is_file() && (!indexed_only || e.indexed))
                    .map(|e| {
                        let relative = e.key()[key.len()..].trim_start_matches('/').to_string();
                        (relative, e.etag.clone(), e.data.len() as u64)
                    })
                    .collect();
                children.sort();
                for (relative, etag, len) in &children {
                    hasher.update(relative.as_bytes());
                    hasher.update(etag.as_bytes());
                    size += len;
                }
                (size, format!("{:x}", hasher.finalize()))
            }
        };
        Metadata {
            file_type: entry.file_type,
            size,
            modified: entry.modified,
            permissions: entry.permissions,
            etag,
            storage_id: self.id.clone(),
        }
    }

    fn lookup(&self, path: &str, indexed_only: bool) -> Option<Metadata> {
        let key = Self::key(path);
        let entry = self.entries.get(&key)?.clone();
        if indexed_only && !entry.indexed {
            return None;
        }
        Some(self.build_metadata(&key, &entry, indexed_only))
    }

    fn copy_subtree(&self, from: &str, to: &str) {
        for key in self.subtree_keys(from) {
            if let Some(entry) = self.entries.get(&key).map(|e| e.clone()) {
                let target = format!("{}{}", to, &key[from.len()..]);
                self.entries.insert(target, entry);
            }
        }
    }

    fn remove_subtree(&self, base: &str) {
        for key in self.subtree_keys(base) {
            self.entries.remove(&key);
        }
    }

    fn check_target_free(&self, key: &str) -> StorageResult<()> {
        if self.entries.contains_key(key) {
            Err(StorageError::AlreadyExists {
                path: key.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn metadata(&self, path: &str) -> StorageResult<Option<Metadata>> {
        self.calls.metadata.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        if self.invalid.load(Ordering::SeqCst) {
            return Err(StorageError::Invalid {
                storage: self.id.clone(),
            });
        }
        Ok(self.lookup(path, true))
    }

    async fn scan(&self, path: &str) -> StorageResult<Option<Metadata>> {
        self.calls.scan.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.lookup(path, false))
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<String>> {
        self.calls.list.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let key = Self::key(path);
        self.require_directory(&key)?;

        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.indexed && !e.key().is_empty() && e.key() != &key)
            .filter_map(|e| {
                let child = TreePath::from(e.key().as_str());
                (child.parent().as_str() == key).then(|| child.name().to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        self.check_available()?;
        let key = Self::key(path);
        match self.entries.get(&key) {
            Some(entry) if entry.file_type.is_file() => Ok(entry.data.clone()),
            Some(_) => Err(StorageError::NotFound { path: key }),
            None => Err(StorageError::NotFound { path: key }),
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        self.calls.write.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let _guard = self.write_lock.lock().await;
        let key = Self::key(path);
        self.require_parent(&key)?;

        let permissions = match self.entries.get(&key) {
            Some(existing) if existing.file_type.is_dir() => {
                return Err(StorageError::AlreadyExists { path: key });
            }
            Some(existing) => existing.permissions,
            None => Permissions::all(),
        };
        let mut entry = MemoryEntry::file(data, true);
        entry.permissions = permissions;
        self.entries.insert(key, entry);
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> StorageResult<()> {
        self.check_available()?;
        let _guard = self.write_lock.lock().await;
        let key = Self::key(path);
        self.require_parent(&key)?;
        self.check_target_free(&key)?;
        self.entries.insert(key, MemoryEntry::directory());
        Ok(())
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.calls.remove.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let _guard = self.write_lock.lock().await;
        let key = Self::key(path);
        if key.is_empty() {
            return Err(StorageError::PermissionDenied {
                path: key,
                operation: "remove".to_string(),
            });
        }
        if !self.entries.contains_key(&key) {
            return Err(StorageError::NotFound { path: key });
        }
        self.remove_subtree(&key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.calls.rename.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let _guard = self.write_lock.lock().await;
        let from = Self::key(from);
        let to = Self::key(to);
        if from.is_empty() || Self::is_within(&to, &from) {
            return Err(StorageError::PermissionDenied {
                path: from,
                operation: "rename".to_string(),
            });
        }
        let source_type = match self.entries.get(&from) {
            Some(entry) => entry.file_type,
            None => return Err(StorageError::NotFound { path: from }),
        };
        self.require_parent(&to)?;

        // A file may replace a file; everything else must land on a free name.
        match self.entries.get(&to).map(|e| e.file_type) {
            Some(FileType::File) if source_type.is_file() => {
                self.entries.remove(&to);
            }
            Some(_) => return Err(StorageError::AlreadyExists { path: to }),
            None => {}
        }

        self.copy_subtree(&from, &to);
        self.remove_subtree(&from);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.calls.copy.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let _guard = self.write_lock.lock().await;
        let from = Self::key(from);
        let to = Self::key(to);
        if !self.entries.contains_key(&from) {
            return Err(StorageError::NotFound { path: from });
        }
        if Self::is_within(&to, &from) {
            return Err(StorageError::PermissionDenied {
                path: to,
                operation: "copy".to_string(),
            });
        }
        self.require_parent(&to)?;
        self.check_target_free(&to)?;
        self.copy_subtree(&from, &to);
        Ok(())
    }
}
