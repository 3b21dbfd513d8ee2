//! Storage operations
//!
//! Listing, reading and mutating operations. Every function takes paths that
//! already went through [`crate::storage::PathResolver`]; mutations re-verify
//! containment right before touching the filesystem.

use log::{debug, error};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

use crate::error::VaultError;
use crate::storage::filesystem::{
    ensure_directory, ensure_exists, ensure_file, ensure_not_exists, ensure_parent_directory,
    link_new,
};
use crate::storage::resolver::ResolvedPath;
use crate::storage::results::{DirectoryEntry, DownloadTarget, listing_order, size_and_mtime};

const RETRIES: u32 = 3;

/// Retries an operation that failed with a transient permission error.
fn with_retries<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if attempt < RETRIES && e.kind() == io::ErrorKind::PermissionDenied => {
                thread::sleep(Duration::from_millis(100 * attempt as u64));
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Lists the direct children of a directory
pub fn list_directory(dir: &ResolvedPath) -> Result<Vec<DirectoryEntry>, VaultError> {
    ensure_directory(dir)?;

    let entries = with_retries(|| fs::read_dir(dir.as_path())).map_err(|e| {
        error!("Failed to list directory {}: {}", dir.as_path().display(), e);
        VaultError::Io(e)
    })?;

    let mut listing = Vec::new();
    for entry in entries.flatten() {
        // Entry may vanish between scan and stat; skip it.
        let Ok(metadata) = entry.path().symlink_metadata() else {
            continue;
        };
        let (size, mtime) = size_and_mtime(&metadata);
        listing.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: metadata.is_dir(),
            size,
            mtime,
        });
    }

    listing.sort_by(|a, b| listing_order(a.is_dir, &a.name, b.is_dir, &b.name));

    debug!(
        "Listed directory {} - {} entries",
        dir.as_path().display(),
        listing.len()
    );

    Ok(listing)
}

/// Creates an empty file; never overwrites
pub fn create_file(target: &ResolvedPath) -> Result<(), VaultError> {
    target.reverify()?;
    ensure_parent_directory(target)?;
    ensure_not_exists(target)?;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target.as_path())
        .map_err(|e| map_create_error(e, target))?;
    Ok(())
}

/// Creates a single directory; the parent must already exist
pub fn create_directory(target: &ResolvedPath) -> Result<(), VaultError> {
    target.reverify()?;
    ensure_parent_directory(target)?;
    ensure_not_exists(target)?;

    fs::create_dir(target.as_path()).map_err(|e| map_create_error(e, target))
}

/// Moves a file or directory; the destination must not exist
pub fn move_entry(src: &ResolvedPath, dst: &ResolvedPath) -> Result<(), VaultError> {
    check_transfer(src, dst)?;

    if fs::symlink_metadata(src.as_path())?.is_dir() {
        // Directories cannot be linked; rename refuses non-empty targets.
        fs::rename(src.as_path(), dst.as_path())?;
        return Ok(());
    }

    link_new(src.as_path(), dst)?;
    if let Err(e) = fs::remove_file(src.as_path()) {
        error!("Failed to remove {} after linking: {}", src.logical(), e);
        let _ = fs::remove_file(dst.as_path());
        return Err(VaultError::Io(e));
    }
    Ok(())
}

/// Copies a file, or a directory tree deeply; the destination must not exist
pub fn copy_entry(src: &ResolvedPath, dst: &ResolvedPath) -> Result<(), VaultError> {
    check_transfer(src, dst)?;

    if src.as_path().is_dir() {
        copy_tree(src.as_path(), dst.as_path())
    } else {
        copy_file_new(src.as_path(), dst.as_path())
            .map_err(|e| map_create_error(e, dst))
    }
}

fn check_transfer(src: &ResolvedPath, dst: &ResolvedPath) -> Result<(), VaultError> {
    src.reverify()?;
    dst.reverify()?;

    if src.is_root() {
        return Err(VaultError::Forbidden("Cannot move or copy a storage root".into()));
    }
    ensure_exists(src)?;
    ensure_parent_directory(dst)?;
    ensure_not_exists(dst)?;

    if dst.as_path().starts_with(src.as_path()) {
        return Err(VaultError::InvalidPath(format!(
            "Cannot place {} inside itself",
            src.logical()
        )));
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), VaultError> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| VaultError::Internal("copy walked outside its source".into()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir(&target)?;
        } else if file_type.is_symlink() {
            copy_link(entry.path(), &target)?;
        } else {
            copy_file_new(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copies file content and permissions into a file that must not exist yet.
fn copy_file_new(src: &Path, dst: &Path) -> io::Result<()> {
    let mut source = fs::File::open(src)?;
    let permissions = source.metadata()?.permissions();
    let mut target = OpenOptions::new().write(true).create_new(true).open(dst)?;

    let copied = io::copy(&mut source, &mut target)
        .and_then(|_| target.flush())
        .and_then(|_| fs::set_permissions(dst, permissions));
    if copied.is_err() {
        let _ = fs::remove_file(dst);
    }
    copied
}

// Links are leaves: recreated as links, never followed.
#[cfg(unix)]
fn copy_link(link: &Path, target: &Path) -> Result<(), VaultError> {
    let destination = fs::read_link(link)?;
    std::os::unix::fs::symlink(destination, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_link(link: &Path, _target: &Path) -> Result<(), VaultError> {
    debug!("Skipping link {} during copy", link.display());
    Ok(())
}

/// Deletes a file, or a directory recursively
pub fn delete_entry(target: &ResolvedPath) -> Result<(), VaultError> {
    target.reverify()?;

    if target.is_root() {
        return Err(VaultError::Forbidden("Cannot delete a storage root".into()));
    }

    let metadata = match fs::symlink_metadata(target.as_path()) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(VaultError::NotFound(target.logical()));
        }
        Err(e) => return Err(VaultError::Io(e)),
    };

    let result = if metadata.is_dir() {
        with_retries(|| fs::remove_dir_all(target.as_path()))
    } else {
        with_retries(|| fs::remove_file(target.as_path()))
    };

    result.map_err(|e| {
        error!("Failed to delete {}: {}", target.as_path().display(), e);
        VaultError::Io(e)
    })
}

/// Writes text content, replacing an existing file atomically or creating a new one
pub fn save_text(target: &ResolvedPath, content: &str) -> Result<(), VaultError> {
    target.reverify()?;
    ensure_parent_directory(target)?;

    if target.as_path().is_dir() {
        return Err(VaultError::NotAFile(target.logical()));
    }

    let temp_path = target.as_path().with_file_name(format!(
        ".{}.{}.tmp",
        target.name(),
        uuid::Uuid::new_v4().simple()
    ));

    let write = || -> io::Result<()> {
        let mut temp = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp.write_all(content.as_bytes())?;
        temp.sync_all()?;
        fs::rename(&temp_path, target.as_path())
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        VaultError::Io(e)
    })
}

/// Reads a UTF-8 text file
pub fn read_text(target: &ResolvedPath) -> Result<String, VaultError> {
    ensure_file(target)?;
    let bytes = fs::read(target.as_path())?;
    String::from_utf8(bytes).map_err(|_| VaultError::NotAFile(format!("{} is not UTF-8 text", target.logical())))
}

/// Describes a file for the API layer to stream
pub fn open_download(target: &ResolvedPath) -> Result<DownloadTarget, VaultError> {
    ensure_file(target)?;
    let metadata = fs::metadata(target.as_path())?;
    Ok(DownloadTarget {
        path: target.as_path().to_path_buf(),
        name: target.name(),
        size: metadata.len(),
    })
}

fn map_create_error(e: io::Error, target: &ResolvedPath) -> VaultError {
    match e.kind() {
        io::ErrorKind::AlreadyExists => VaultError::AlreadyExists(target.logical()),
        io::ErrorKind::NotFound => VaultError::NotFound(target.logical()),
        _ => VaultError::Io(e),
    }
}
