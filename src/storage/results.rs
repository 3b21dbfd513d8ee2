//! Storage result types
//!
//! Defines result structures returned by storage operations.

use serde::Serialize;
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// One row of a non-recursive directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// Last modified time (epoch seconds)
    pub mtime: i64,
}

/// A node of a recursive hierarchy listing. Each node owns its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Logical path a caller can submit back to reach this node
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
    pub children: Vec<TreeNode>,
}

/// A match from a recursive name search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: i64,
}

/// Everything the API layer needs to stream a file back to the caller
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub path: std::path::PathBuf,
    pub name: String,
    pub size: u64,
}

/// Size and mtime as reported in listings; directories report size 0.
pub(crate) fn size_and_mtime(metadata: &Metadata) -> (u64, i64) {
    let size = if metadata.is_dir() { 0 } else { metadata.len() };

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|dur| dur.as_secs() as i64)
        .unwrap_or(0);

    (size, mtime)
}

/// Directories first, then case-insensitive name order.
pub(crate) fn listing_order(a_dir: bool, a_name: &str, b_dir: bool, b_name: &str) -> std::cmp::Ordering {
    b_dir
        .cmp(&a_dir)
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        .then_with(|| a_name.cmp(b_name))
}
