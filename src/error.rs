//! Error types for the Rewind library
//!
//! This module defines all error types that can occur while recording,
//! restoring, or maintaining file versions. Errors are designed to be
//! informative and actionable; failure kinds that are part of a restore
//! *result* (no matching version, unavailable content, live-file write
//! failure) live on [`crate::types::RestoreOutcome`] instead, so a
//! user-facing undo never silently no-ops.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Rewind library
pub type Result<T> = std::result::Result<T, RewindError>;

/// Main error type for all Rewind operations
#[derive(Debug, Error)]
pub enum RewindError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog read errors surfaced by SQLite
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Transactional catalog write failed; the operation is retriable
    #[error("catalog write failed: {0}")]
    CatalogWriteFailure(String),

    /// A file exists but its bytes could not be read mid-record
    #[error("content unreadable: {path:?}")]
    ContentUnreadable {
        /// Path whose bytes could not be read
        path: PathBuf,
    },

    /// Object not found in the content store
    #[error("object not found in content store: {0}")]
    ObjectNotFound(String),

    /// Decompression errors for stored blobs
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Stored blob bytes do not hash back to their digest
    #[error("digest mismatch - expected: {expected}, actual: {actual}")]
    DigestMismatch {
        /// Digest the blob is stored under
        expected: String,
        /// Digest recomputed from the stored bytes
        actual: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("internal error: {0}")]
    Internal(String),
}

impl RewindError {
    /// Create a catalog write failure with a custom message
    pub fn catalog_write(msg: impl Into<String>) -> Self {
        RewindError::CatalogWriteFailure(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        RewindError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        RewindError::Internal(msg.into())
    }

    /// Check if this error is worth retrying
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RewindError::CatalogWriteFailure(_)
                | RewindError::Catalog(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: rusqlite::ffi::ErrorCode::DatabaseBusy
                            | rusqlite::ffi::ErrorCode::DatabaseLocked,
                        ..
                    },
                    _,
                ))
        )
    }

    /// Check if this error indicates corrupted store contents
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RewindError::DigestMismatch { .. } | RewindError::Decompression(_)
        )
    }
}
