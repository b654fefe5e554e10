// Module declarations
pub mod path;
pub mod metadata;
pub mod node;
pub mod mount;
pub mod request;
pub mod config;

// Re-export all types from submodules
pub use path::TreePath;
pub use metadata::{FileType, Permissions, Metadata};
pub use node::{FileInfo, Node};
pub use mount::{Mount, MountOptions};
pub use request::RequestContext;
pub use config::{LogLevel, TreeConfig, ConfigError, MountRecord, DEFAULT_PART_EXTENSION, DEFAULT_MAX_NAME_LENGTH};
