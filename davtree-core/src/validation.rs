//! Naming rules for tree entries.

use crate::error::{StorageError, StorageResult};

/// Characters that may not appear in an entry name.
pub const RESERVED_CHARACTERS: &[char] = &['\\', '/', '<', '>', ':', '"', '|', '?', '*'];

/// Checks a single entry name.
///
/// Rejects empty and whitespace-only names, `.` and `..`, reserved and
/// control characters, trailing whitespace, and names longer than
/// `max_length` bytes.
pub fn verify_name(name: &str, max_length: usize) -> StorageResult<()> {
    let invalid = |reason: String| StorageError::InvalidPathName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("empty filename is not allowed".to_string()));
    }
    if name == "." || name == ".." {
        return Err(invalid("dot files are not allowed".to_string()));
    }
    if let Some(c) = name.chars().find(|c| RESERVED_CHARACTERS.contains(c)) {
        return Err(invalid(format!("contains invalid character {:?}", c)));
    }
    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(invalid(format!("contains control character {:#04x}", c as u32)));
    }
    if name.ends_with(char::is_whitespace) {
        return Err(invalid("trailing whitespace is not allowed".to_string()));
    }
    if name.len() > max_length {
        return Err(invalid(format!(
            "file name too long ({} > {} bytes)",
            name.len(),
            max_length
        )));
    }
    Ok(())
}
