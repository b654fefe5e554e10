//! In-memory collaborators: a storage backend and a mount registry.
//!
//! Both are complete implementations of their traits and back the
//! command-line tool as well as the test suites.

mod registry;
mod storage;

pub use registry::MemoryMountRegistry;
pub use storage::{MemoryStorage, StorageCalls, StoredEntry};
