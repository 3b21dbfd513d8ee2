//! Transfer result types

use serde::Serialize;

/// Outcome of a multi-item operation. Per-item failures are counted, not reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of building a zip archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub files_added: usize,
    pub skipped: usize,
}

/// One file of a multi-file upload
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub name: String,
    pub data: Vec<u8>,
}

/// A chunked upload reassembled into its destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedUpload {
    /// Logical path of the new file
    pub path: String,
    pub size: u64,
}
