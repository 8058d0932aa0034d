//! Entry name checks.
//!
//! Extraction treats both `/` and `\` as separators so that names produced
//! on Windows cannot smuggle a `..` past the check.

use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

/// Turn an entry name into a relative path that cannot leave its folder.
pub(crate) fn sanitize_entry_name(name: &str, max_len: usize) -> StoreResult<PathBuf> {
    if name.len() > max_len {
        return Err(StoreError::LimitExceeded {
            message: format!("entry name length {} exceeds limit {}", name.len(), max_len),
        });
    }
    if name.contains('\0') {
        return Err(StoreError::invalid_path(name, "NUL byte in entry name"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(StoreError::invalid_path(name, "absolute entry name"));
    }

    let mut path = PathBuf::new();
    for (i, segment) in name.split(['/', '\\']).enumerate() {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StoreError::invalid_path(
                    name,
                    "entry name escapes the destination folder",
                ))
            }
            _ if i == 0 && is_drive_prefix(segment) => {
                return Err(StoreError::invalid_path(name, "drive-qualified entry name"))
            }
            _ => path.push(segment),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(StoreError::invalid_path(name, "empty entry name"));
    }
    Ok(path)
}

/// Names accepted by the writer: relative, `/`-separated file paths.
pub(crate) fn validate_entry_name(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        Some("empty entry name")
    } else if name.contains('\0') {
        Some("NUL byte in entry name")
    } else if name.contains('\\') {
        Some("use '/' as the separator")
    } else if name.starts_with('/') {
        Some("absolute entry name")
    } else if name.ends_with('/') {
        Some("directory entries are not written")
    } else if name.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        Some("empty, '.' or '..' segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::invalid_path(name, reason)),
        None => Ok(()),
    }
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
