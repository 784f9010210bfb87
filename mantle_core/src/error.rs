//! Error types for mantle_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using mantle_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during manifest and store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A reference string is not valid hex of an accepted length.
    #[error("value not valid hex string of length {expected_len}: {value}")]
    InvalidReference { value: String, expected_len: usize },

    /// No node terminates at, or starts with, the requested path.
    #[error("Could not deserialize or find node for reference {reference} and path {path}")]
    PathNotFound { reference: String, path: String },

    /// A manifest node's bytes could not be decoded.
    #[error("Corrupt manifest node: {reason}")]
    CorruptManifest { reason: String },

    /// A node was encoded while one of its forks still pointed at an unsaved node.
    #[error("Fork {prefix:?} points at a node that has not been sealed")]
    UnsealedFork { prefix: String },

    /// Path cannot be stored in a manifest.
    #[error("Invalid path: {reason}")]
    InvalidPath { reason: String },

    /// Blob store has no object for the reference.
    #[error("Object not found: {reference}")]
    NotFound { reference: String },

    /// A transport-backed blob store answered with an HTTP error status.
    #[error("{}", http_message(*status, message))]
    Http { status: u16, message: String },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Compression or decompression failed.
    #[error("Compression error: {reason}")]
    Compression { reason: String },
}

/// Coarse classification of an [`Error`], used by callers that map failures
/// to user messages or exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidReference,
    InvalidPath,
    PathNotFound,
    CorruptManifest,
    BlobStore,
    Io,
}

impl Error {
    /// Create an InvalidReference error.
    pub fn invalid_reference(value: impl Into<String>, expected_len: usize) -> Self {
        Error::InvalidReference {
            value: value.into(),
            expected_len,
        }
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(reference: impl Into<String>, path: impl Into<String>) -> Self {
        Error::PathNotFound {
            reference: reference.into(),
            path: path.into(),
        }
    }

    /// Create a CorruptManifest error.
    pub fn corrupt_manifest(reason: impl Into<String>) -> Self {
        Error::CorruptManifest {
            reason: reason.into(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(reference: impl Into<String>) -> Self {
        Error::NotFound {
            reference: reference.into(),
        }
    }

    /// Create an Http error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidReference { .. } => ErrorKind::InvalidReference,
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::PathNotFound { .. } => ErrorKind::PathNotFound,
            Error::CorruptManifest { .. } | Error::UnsealedFork { .. } => {
                ErrorKind::CorruptManifest
            }
            Error::NotFound { .. }
            | Error::Http { .. }
            | Error::CorruptedObject { .. }
            | Error::InvalidStore { .. }
            | Error::Compression { .. } => ErrorKind::BlobStore,
            Error::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Reason phrase for the HTTP status codes a blob store commonly answers with.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}

fn http_message(status: u16, message: &str) -> String {
    let reason = reason_phrase(status);
    if message.is_empty() || message == reason {
        format!("responded with HTTP {} ({})", status, reason)
    } else {
        format!("responded with HTTP {} ({}): {}", status, reason, message)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
