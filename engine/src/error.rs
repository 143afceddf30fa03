//! Error types for the sync engine.
//!
//! There are two layers of errors:
//! - `EngineError` is fatal and raised before any object is transferred
//!   (missing source root, missing backend credentials, bad configuration).
//! - `TransferError` belongs to a single file. It is recorded on the
//!   `FileItem` and counted in the run summary; the run keeps going.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::JobState;

/// Job-level errors. Any of these stops the run before the first transfer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory exists but cannot be inspected
    #[error("Source directory access denied: {}: {source}", path.display())]
    SourceAccessDenied { path: PathBuf, source: io::Error },

    /// Path is unusable (not a directory, not under the root, not UTF-8)
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to list the source root
    #[error("Failed to enumerate directory: {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// A cloud backend was selected or detected without all of its credentials
    #[error("{backend} credentials not configured! Set {}", missing.join(", "))]
    MissingCredentials {
        backend: &'static str,
        missing: Vec<&'static str>,
    },

    /// Unrecognized storage backend name
    #[error("Unknown storage backend '{name}'. Must be 'cloudinary', 's3', or 'local'")]
    UnknownBackend { name: String },

    /// Configuration file could not be read or parsed
    #[error("Invalid configuration file {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// Backend client could not be constructed
    #[error("Failed to initialize {backend} backend: {message}")]
    BackendInit {
        backend: &'static str,
        message: String,
    },

    /// Lifecycle operation called on a job in the wrong state
    #[error("Job must be in Pending state to {operation}; current state: {state:?}")]
    JobNotPending {
        operation: &'static str,
        state: JobState,
    },
}

/// Per-file failure during the existence check or the write.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source file could not be opened
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Local destination could not be inspected
    #[error("cannot check {key}: {source}")]
    Check { key: String, source: io::Error },

    /// Source bytes could not be read while streaming to the destination
    #[error("failed to read {key}: {source}")]
    Read { key: String, source: io::Error },

    /// Local destination could not be written
    #[error("failed to write {key}: {source}")]
    Write { key: String, source: io::Error },

    /// Remote backend refused or failed the request
    #[error("{backend} request for {key} failed: {message}")]
    Backend {
        backend: &'static str,
        key: String,
        message: String,
    },
}
