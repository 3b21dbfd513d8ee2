//! Error types
//!
//! Defines the typed failure raised by every core entry point. The transport
//! layer maps these to responses through [`crate::error::handlers`].

use std::io;
use thiserror::Error;

/// Stable, machine-readable classification of a [`VaultError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPath,
    PathTraversal,
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    AuthorizationRequired,
    Forbidden,
    RateLimited,
    IncompleteUpload,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPath => "invalid_path",
            ErrorKind::PathTraversal => "path_traversal",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotADirectory => "not_a_directory",
            ErrorKind::NotAFile => "not_a_file",
            ErrorKind::AuthorizationRequired => "authorization_required",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::IncompleteUpload => "incomplete_upload",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Failure raised by the resolver, the share store, access control and
/// filesystem operations.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Authorization required: {0}")]
    AuthorizationRequired(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many login attempts for user: {0}")]
    RateLimited(String),

    #[error("Upload incomplete, missing chunks: {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::InvalidPath(_) => ErrorKind::InvalidPath,
            VaultError::PathTraversal(_) => ErrorKind::PathTraversal,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VaultError::NotADirectory(_) => ErrorKind::NotADirectory,
            VaultError::NotAFile(_) => ErrorKind::NotAFile,
            VaultError::AuthorizationRequired(_) => ErrorKind::AuthorizationRequired,
            VaultError::Forbidden(_) => ErrorKind::Forbidden,
            VaultError::RateLimited(_) => ErrorKind::RateLimited,
            VaultError::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            VaultError::Io(_) | VaultError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(error: serde_json::Error) -> Self {
        VaultError::Internal(format!("share store encoding: {error}"))
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e) => VaultError::Io(e),
            other => VaultError::Internal(format!("archive: {other}")),
        }
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(error: walkdir::Error) -> Self {
        match error.into_io_error() {
            Some(e) => VaultError::Io(e),
            None => VaultError::Internal("filesystem loop detected".into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
