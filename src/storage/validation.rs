//! Path validation
//!
//! Logical path normalization and entry-name checks shared by the resolver
//! and the operations that create new entries.

use crate::error::VaultError;

/// Validates a name for a single new entry (file, directory or upload).
pub fn validate_entry_name(name: &str) -> Result<&str, VaultError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(VaultError::InvalidPath("Name cannot be empty".into()));
    }
    if trimmed.contains('\0') {
        return Err(VaultError::InvalidPath("Name contains a null byte".into()));
    }
    if trimmed.split(['/', '\\']).any(|segment| segment.trim() == "..") {
        return Err(VaultError::PathTraversal(name.to_string()));
    }
    if trimmed == "." || trimmed.contains(['/', '\\']) {
        return Err(VaultError::InvalidPath(format!("Invalid name: {name}")));
    }

    Ok(trimmed)
}

/// Splits a separator-normalized relative path into meaningful segments.
///
/// Empty and `.` segments are dropped; `..` has already been rejected.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Rejects a null byte anywhere in the input.
pub(crate) fn reject_null(input: &str) -> Result<(), VaultError> {
    if input.contains('\0') {
        return Err(VaultError::InvalidPath("Path contains a null byte".into()));
    }
    Ok(())
}

/// Rejects any `..` segment, before any prefix is interpreted.
pub(crate) fn reject_traversal(input: &str, normalized: &str) -> Result<(), VaultError> {
    if normalized.split('/').any(|s| s == "..") {
        return Err(VaultError::PathTraversal(input.to_string()));
    }
    Ok(())
}

/// Rejects paths that stay absolute after one leading separator is dropped,
/// including drive-letter forms such as `C:/...`.
pub(crate) fn reject_absolute(input: &str, normalized: &str) -> Result<(), VaultError> {
    let first = normalized.split('/').next().unwrap_or("");
    let drive = first.len() == 2
        && first.ends_with(':')
        && first.starts_with(|c: char| c.is_ascii_alphabetic());

    if normalized.starts_with("//") || drive {
        return Err(VaultError::InvalidPath(format!(
            "Absolute paths are not allowed: {input}"
        )));
    }
    Ok(())
}

/// Canonical separator form: backslashes become `/`.
pub(crate) fn unify_separators(input: &str) -> String {
    input.replace('\\', "/")
}

/// Collapses repeated separators and drops one leading separator.
pub(crate) fn collapse(normalized: &str) -> String {
    normalized
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
