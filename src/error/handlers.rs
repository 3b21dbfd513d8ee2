//! Error handlers
//!
//! Translation helpers for the API layer: stable kind, status code and a
//! caller-safe detail string.

use crate::error::types::{ErrorKind, VaultError};
use log::{error, warn};

/// Log an error at a level matching its kind.
pub fn handle_error(err: &VaultError) {
    match err.kind() {
        ErrorKind::Internal => error!("Vault internal error: {}", err),
        ErrorKind::PathTraversal | ErrorKind::RateLimited => warn!("Vault rejected request: {}", err),
        _ => {}
    }
}

/// Machine-readable kind string for the response body.
pub fn error_kind(err: &VaultError) -> &'static str {
    err.kind().as_str()
}

/// Convert error to HTTP status code
pub fn error_to_status(err: &VaultError) -> u16 {
    match err.kind() {
        ErrorKind::InvalidPath => 400,
        ErrorKind::PathTraversal => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::AlreadyExists => 409,
        ErrorKind::NotADirectory => 400,
        ErrorKind::NotAFile => 400,
        ErrorKind::AuthorizationRequired => 401,
        ErrorKind::Forbidden => 403,
        ErrorKind::RateLimited => 429,
        ErrorKind::IncompleteUpload => 409,
        ErrorKind::Internal => 500,
    }
}

/// Human detail for the caller. Internal failures never leak their cause.
pub fn public_detail(err: &VaultError) -> String {
    match err.kind() {
        ErrorKind::Internal => "Internal server error".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn internal_detail_is_generic() {
        let err = VaultError::Io(io::Error::new(io::ErrorKind::Other, "/srv/files/secret"));
        assert_eq!(error_kind(&err), "internal");
        assert_eq!(error_to_status(&err), 500);
        assert_eq!(public_detail(&err), "Internal server error");
    }

    #[test]
    fn incomplete_upload_lists_missing_chunks() {
        let err = VaultError::IncompleteUpload { missing: vec![1, 3] };
        assert_eq!(error_kind(&err), "incomplete_upload");
        assert!(public_detail(&err).contains("[1, 3]"));
    }

    #[test]
    fn access_errors_map_to_distinct_statuses() {
        assert_eq!(error_to_status(&VaultError::AuthorizationRequired("x".into())), 401);
        assert_eq!(error_to_status(&VaultError::Forbidden("x".into())), 403);
        assert_eq!(error_to_status(&VaultError::RateLimited("x".into())), 429);
    }
}
