//! File transfer
//!
//! Single-shot and chunked uploads, and zip downloads.

pub mod archive;
pub mod file_ops;
pub mod results;
pub mod uploads;

pub use archive::write_archive;
pub use file_ops::store_upload;
pub use results::{ArchiveSummary, BatchSummary, CompletedUpload, UploadItem};
pub use uploads::UploadRegistry;

use crate::error::VaultError;

/// Runs blocking filesystem work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, VaultError>
where
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VaultError::Internal(format!("blocking task failed: {e}")))?
}
