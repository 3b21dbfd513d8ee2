//! Zip downloads
//!
//! Files are stored under their own name, directories recursively under
//! `<dir name>/...`. Symbolic links are skipped and never followed. Entries
//! that cannot be read are skipped and counted instead of failing the archive.

use log::{debug, warn};
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::VaultError;
use crate::storage::ResolvedPath;
use crate::transfer::results::ArchiveSummary;

/// Writes every item into a zip stream and returns the finished writer.
pub fn write_archive<W: Write + Seek>(
    items: &[ResolvedPath],
    writer: W,
) -> Result<(W, ArchiveSummary), VaultError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut summary = ArchiveSummary::default();

    for item in items {
        if let Err(e) = item.reverify() {
            warn!("Skipping {} in archive: {}", item.logical(), e);
            summary.skipped += 1;
            continue;
        }

        let base = item.name();
        let metadata = match std::fs::symlink_metadata(item.as_path()) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {} in archive: {}", item.logical(), e);
                summary.skipped += 1;
                continue;
            }
        };

        if metadata.is_file() {
            record(&mut summary, add_file(&mut zip, item.as_path(), &base, options));
        } else if metadata.is_dir() {
            add_tree(&mut zip, item.as_path(), &base, options, &mut summary);
        } else {
            summary.skipped += 1;
        }
    }

    let writer = zip.finish()?;
    debug!(
        "Archive complete: {} files, {} skipped",
        summary.files_added, summary.skipped
    );
    Ok((writer, summary))
}

fn add_tree<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    base: &str,
    options: SimpleFileOptions,
    summary: &mut ArchiveSummary,
) {
    // Two requested directories with the same name collide at the top level.
    if let Err(e) = zip.add_directory(format!("{base}/"), options) {
        warn!("Skipping directory {} in archive: {}", dir.display(), e);
        summary.skipped += 1;
        return;
    }

    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Unreadable entry under {}: {}", dir.display(), e);
                summary.skipped += 1;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(dir) else {
            summary.skipped += 1;
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let name = format!("{base}/{name}");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if let Err(e) = zip.add_directory(format!("{name}/"), options) {
                warn!("Skipping directory {} in archive: {}", name, e);
                summary.skipped += 1;
            }
        } else if file_type.is_file() {
            record(summary, add_file(zip, entry.path(), &name, options));
        } else {
            debug!("Skipping link {} in archive", name);
            summary.skipped += 1;
        }
    }
}

fn add_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<(), VaultError> {
    let mut source = File::open(path)?;
    zip.start_file(name, options)?;
    io::copy(&mut source, zip)?;
    Ok(())
}

fn record(summary: &mut ArchiveSummary, result: Result<(), VaultError>) {
    match result {
        Ok(()) => summary.files_added += 1,
        Err(e) => {
            warn!("Skipping file in archive: {}", e);
            summary.skipped += 1;
        }
    }
}
