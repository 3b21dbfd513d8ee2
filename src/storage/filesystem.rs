//! File system guards
//!
//! Existence and kind checks run before an operation touches a resolved path.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::VaultError;
use crate::storage::resolver::ResolvedPath;

/// Target must exist and be a directory
pub fn ensure_directory(path: &ResolvedPath) -> Result<(), VaultError> {
    match fs::metadata(path.as_path()) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(VaultError::NotADirectory(path.logical())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VaultError::NotFound(path.logical()))
        }
        Err(e) => Err(VaultError::Io(e)),
    }
}

/// Target must exist and be a regular file
pub fn ensure_file(path: &ResolvedPath) -> Result<(), VaultError> {
    match fs::metadata(path.as_path()) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(VaultError::NotAFile(path.logical())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VaultError::NotFound(path.logical()))
        }
        Err(e) => Err(VaultError::Io(e)),
    }
}

/// Target must exist in any form; dangling links count as existing
pub fn ensure_exists(path: &ResolvedPath) -> Result<(), VaultError> {
    if entry_exists(path) {
        Ok(())
    } else {
        Err(VaultError::NotFound(path.logical()))
    }
}

/// Nothing may exist at the target, not even a dangling link
pub fn ensure_not_exists(path: &ResolvedPath) -> Result<(), VaultError> {
    if entry_exists(path) {
        Err(VaultError::AlreadyExists(path.logical()))
    } else {
        Ok(())
    }
}

/// The parent of a target to be created must be an existing directory
pub fn ensure_parent_directory(path: &ResolvedPath) -> Result<(), VaultError> {
    match path.parent() {
        Some(parent) => ensure_directory(&parent),
        None => Err(VaultError::AlreadyExists(path.logical())),
    }
}

/// Gives the file at `from` a second name at `target`.
///
/// Creating a hard link fails atomically when the name is taken, so a
/// concurrent writer can never be overwritten. `from` keeps its own name.
pub fn link_new(from: &Path, target: &ResolvedPath) -> Result<(), VaultError> {
    fs::hard_link(from, target.as_path()).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => VaultError::AlreadyExists(target.logical()),
        _ => VaultError::Io(e),
    })
}

fn entry_exists(path: &ResolvedPath) -> bool {
    fs::symlink_metadata(path.as_path()).is_ok()
}
