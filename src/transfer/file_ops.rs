//! Module `file_ops`
//!
//! Single-shot file uploads. Data is streamed into a temporary sibling of the
//! destination and linked into place once complete, so a failed upload
//! never leaves a partial file under the final name.

use log::{error, info, warn};
use std::fs::{File, OpenOptions, remove_file};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::VaultError;
use crate::storage::ResolvedPath;
use crate::storage::filesystem::{ensure_not_exists, ensure_parent_directory, link_new};

const MAX_RETRIES: usize = 3;
const BUFFER_SIZE: usize = 8192; // 8KB buffer for better performance

/// Temporary sibling used while `target` is being written.
pub(crate) fn temp_sibling(target: &ResolvedPath, tag: &str) -> PathBuf {
    target.as_path().with_file_name(format!(
        ".{}.{}.{}",
        target.name(),
        uuid::Uuid::new_v4().simple(),
        tag
    ))
}

/// Streams `source` into a new file at `target`; never overwrites.
///
/// Returns the number of bytes stored.
pub fn store_upload<R: Read>(
    mut source: R,
    target: &ResolvedPath,
    max_size: u64,
) -> Result<u64, VaultError> {
    target.reverify()?;
    ensure_parent_directory(target)?;
    ensure_not_exists(target)?;

    let temp_path = temp_sibling(target, "upload");
    info!(
        "Starting file upload: {} -> {}",
        temp_path.display(),
        target.as_path().display()
    );

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|e| {
            error!("Failed to create temporary file {}: {e}", temp_path.display());
            VaultError::Io(e)
        })?;

    let total = match copy_limited(&mut source, &mut temp_file, max_size) {
        Ok(total) => total,
        Err(e) => {
            drop(temp_file);
            let _ = remove_file(&temp_path);
            return Err(e);
        }
    };
    drop(temp_file);

    finish_upload(&temp_path, target)?;

    info!(
        "File upload completed successfully: {} ({total} bytes)",
        target.as_path().display()
    );
    Ok(total)
}

fn copy_limited<R: Read>(source: &mut R, temp_file: &mut File, max_size: u64) -> Result<u64, VaultError> {
    let mut buffer = [0; BUFFER_SIZE];
    let mut total_bytes_received = 0u64;

    loop {
        let mut retries = 0;
        let n = loop {
            match source.read(&mut buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted && retries < MAX_RETRIES => {
                    warn!(
                        "Transient read error (attempt {}/{}): {}. Retrying...",
                        retries + 1,
                        MAX_RETRIES,
                        e
                    );
                    retries += 1;
                    thread::sleep(Duration::from_millis(100 * retries as u64));
                }
                Err(e) => {
                    error!("Read failure after {MAX_RETRIES} retries: {e}");
                    return Err(VaultError::Io(e));
                }
            }
        };

        if n == 0 {
            break; // End of file reached
        }

        // Check file size limit BEFORE writing (fail fast)
        total_bytes_received += n as u64;
        if total_bytes_received > max_size {
            error!("File size limit exceeded: {total_bytes_received} bytes > {max_size} bytes");
            return Err(VaultError::Forbidden(format!(
                "File exceeds the {max_size} byte upload limit"
            )));
        }

        temp_file.write_all(&buffer[..n])?;
    }

    temp_file.flush()?;
    temp_file.sync_all()?;
    Ok(total_bytes_received)
}

/// Links a completed temporary file in as `target` and drops the temporary name.
///
/// Fails with `AlreadyExists` if anything took the name meanwhile; the
/// existing entry is left untouched.
pub(crate) fn finish_upload(temp_path: &Path, target: &ResolvedPath) -> Result<(), VaultError> {
    let result = target.reverify().and_then(|_| link_new(temp_path, target));

    if let Err(e) = &result {
        error!(
            "Failed to move {} to {}: {e}",
            temp_path.display(),
            target.as_path().display()
        );
    }
    if let Err(e) = remove_file(temp_path) {
        warn!("Failed to remove temporary file {}: {e}", temp_path.display());
    }
    result
}
