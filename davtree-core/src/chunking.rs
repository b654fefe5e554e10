//! Chunked upload naming.
//!
//! Clients that upload a large file in pieces name every piece
//! `<name>-chunking-<transferId>-<chunkCount>-<index>`. While such an upload
//! is in flight all piece names stand for the one logical file `<name>`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::TreePath;

/// A decoded chunk file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkName {
    /// Name of the logical target file
    pub name: String,
    /// Transfer session the chunk belongs to, as sent by the client
    pub transfer_id: String,
    /// Total number of chunks in the transfer
    pub chunk_count: String,
    /// Zero based position of this chunk
    pub index: String,
}

fn chunk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>.+)-chunking-(?P<transfer>\d+)-(?P<count>\d+)-(?P<index>\d+)$")
            .expect("chunk name pattern is valid")
    })
}

impl ChunkName {
    /// Decodes a leaf name. Returns `None` for names that are not chunks.
    ///
    /// The numeric fields are kept as digit strings of any length.
    pub fn decode(leaf: &str) -> Option<Self> {
        let caps = chunk_pattern().captures(leaf)?;
        Some(Self {
            name: caps["name"].to_string(),
            transfer_id: caps["transfer"].to_string(),
            chunk_count: caps["count"].to_string(),
            index: caps["index"].to_string(),
        })
    }

    /// Returns true for the final chunk of the transfer.
    ///
    /// Counts too large for `u64` are never reported as last.
    pub fn is_last(&self) -> bool {
        match (self.index.parse::<u64>(), self.chunk_count.parse::<u64>()) {
            (Ok(index), Ok(count)) => index.checked_add(1) == Some(count),
            _ => false,
        }
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-chunking-{}-{}-{}",
            self.name, self.transfer_id, self.chunk_count, self.index
        )
    }
}

/// Rewrites a chunk path to the path of its logical target file.
///
/// Only applies when `chunked_upload` is set; otherwise, or when the leaf is
/// not a chunk name, the path is returned unchanged.
pub fn resolve_chunk_name(path: &TreePath, chunked_upload: bool) -> TreePath {
    if !chunked_upload {
        return path.clone();
    }
    let (dir, leaf) = path.split();
    match ChunkName::decode(leaf) {
        Some(chunk) => dir.join(chunk.name),
        None => path.clone(),
    }
}
