//! Small sysfs readers
//!
//! Attribute helpers return `Option` when the attribute is optional and
//! `Result` when the caller needs to know why a lookup failed.

use std::fs;
use std::path::Path;

use crate::error::{RdmaCdiError, Result};

/// Read a sysfs attribute, trimming whitespace and a leading `0x`.
///
/// Returns `None` if the file is missing, unreadable or empty.
pub fn read_attr(path: &Path) -> Option<String> {
    let data = fs::read_to_string(path).ok()?;
    let value = data.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Read a sysfs attribute verbatim apart from surrounding whitespace
pub fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|data| data.trim().to_string())
        .map_err(|e| RdmaCdiError::io(path, e))
}

/// Final path segment of a symlink target (e.g. a driver or PCI address)
pub fn link_basename(path: &Path) -> Result<String> {
    let target = fs::read_link(path).map_err(|e| RdmaCdiError::io(path, e))?;
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            RdmaCdiError::NotFound(format!(
                "symlink {} has no final path segment",
                path.display()
            ))
        })
}

/// Sorted entry names of a directory
pub fn list_dir(path: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(path).map_err(|e| RdmaCdiError::io(path, e))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}
