//! Logging middleware
//!
//! Access logging for vault operations.

use log::{info, warn};
use std::path::Path;

/// Log a completed mutating operation
pub fn log_operation(actor: &str, operation: &str, path: &Path) {
    info!("{} {}: {}", actor, operation, path.display());
}

/// Log a path that was refused before reaching the filesystem
pub fn log_rejected_path(actor: &str, input: &str, reason: &str) {
    warn!("Rejected path from {}: {:?} ({})", actor, input, reason);
}
